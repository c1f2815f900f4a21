//! §4.5 Workflow Trigger Engine: closed-set event -> condition -> action
//! rules. Conditions are a small, total, side-effect-free expression
//! language over event fields and a read-only client snapshot; actions are
//! confined to a closed set and only ever enqueue a Task.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ids::{ClientId, TenantId, TriggerId};
use crate::error::CoreResult;
use crate::events::DomainEvent;
use crate::persistence::Store;
use crate::task_queue::{TaskQueue, TaskType};

/// Read-only denormalized client attributes a condition may reference,
/// refreshed from the relevant aggregate's commit events (§5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub client_id: Option<ClientId>,
    pub current_round: u8,
    pub lifecycle_stage: String,
    pub croa_cleared: bool,
}

/// A restricted predicate: `event.field == value`, `event.field != value`,
/// or a conjunction of such clauses. Deliberately not Turing-complete —
/// every condition terminates in constant time (§4.5 "total").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    Always,
    EventFieldEquals { field: String, value: Value },
    SnapshotRoundAtLeast { round: u8 },
    SnapshotCroaCleared(bool),
    All(Vec<Condition>),
}

impl Condition {
    pub fn evaluate(&self, event: &DomainEvent, snapshot: &ClientSnapshot) -> bool {
        match self {
            Condition::Always => true,
            Condition::EventFieldEquals { field, value } => {
                event.payload.get(field).map(|v| v == value).unwrap_or(false)
            }
            Condition::SnapshotRoundAtLeast { round } => snapshot.current_round >= *round,
            Condition::SnapshotCroaCleared(expected) => snapshot.croa_cleared == *expected,
            Condition::All(clauses) => clauses.iter().all(|c| c.evaluate(event, snapshot)),
        }
    }
}

/// The closed set of actions a trigger may take. Every variant only ever
/// enqueues a Task; triggers never write state directly (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Action {
    SendEmail { template: String, to: String },
    SendSms { template: String, to: String },
    CreateTask { task_type: TaskType, payload: Value, delay_seconds: i64 },
    UpdateStatus { target: String, value: String },
    AssignStaff { role: String },
    AddNote { text: String },
    ScheduleFollowup { when: chrono::DateTime<chrono::Utc> },
    GenerateDocument { kind: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: TriggerId,
    pub tenant_id: TenantId,
    pub event_type: String,
    pub condition: Condition,
    pub action: Action,
    pub priority: i32,
    pub enabled: bool,
}

impl WorkflowTrigger {
    fn storage_key(id: TriggerId) -> String {
        format!("trigger:{id}")
    }
}

pub struct TriggerEngine {
    store: Store,
    task_queue: TaskQueue,
}

impl TriggerEngine {
    pub fn new(store: Store, task_queue: TaskQueue) -> Self {
        Self { store, task_queue }
    }

    pub fn register(&self, trigger: WorkflowTrigger) -> CoreResult<()> {
        self.store.put(&WorkflowTrigger::storage_key(trigger.id), &trigger)
    }

    /// Selects enabled triggers whose `event_type` matches, evaluates them
    /// in priority order, and enqueues the action as a Task for each match.
    pub fn handle(&self, event: &DomainEvent, snapshot: &ClientSnapshot) -> CoreResult<Vec<uuid::Uuid>> {
        let mut triggers: Vec<WorkflowTrigger> = self
            .store
            .scan_prefix::<WorkflowTrigger>("trigger:")?
            .into_iter()
            .filter(|t| t.enabled && t.event_type == event.event_type)
            .collect();
        triggers.sort_by_key(|t| -t.priority);

        let mut enqueued = Vec::new();
        for trigger in triggers {
            if !trigger.condition.evaluate(event, snapshot) {
                continue;
            }
            let idem_key = format!("trigger:{}:{}", trigger.id, event.id);
            let (task_type, payload, delay_seconds) = self.translate_action(&trigger.action, event)?;
            let run_at = event.commit_ts + chrono::Duration::seconds(delay_seconds);
            let task_id = self.task_queue.enqueue(event.tenant, task_type, payload, run_at, &idem_key, 5)?;
            enqueued.push(task_id.0);
        }
        Ok(enqueued)
    }

    fn translate_action(&self, action: &Action, event: &DomainEvent) -> CoreResult<(TaskType, Value, i64)> {
        Ok(match action {
            Action::SendEmail { template, to } => {
                (TaskType::SendEmail, serde_json::json!({"template": template, "to": to}), 0)
            }
            Action::SendSms { template, to } => {
                (TaskType::SendSms, serde_json::json!({"template": template, "to": to}), 0)
            }
            Action::CreateTask { task_type, payload, delay_seconds } => (*task_type, payload.clone(), *delay_seconds),
            Action::UpdateStatus { target, value } => {
                (TaskType::AdvanceRound, serde_json::json!({"target": target, "value": value}), 0)
            }
            Action::AssignStaff { role } => {
                (TaskType::SendReminder, serde_json::json!({"assign_role": role}), 0)
            }
            Action::AddNote { text } => (TaskType::SendReminder, serde_json::json!({"note": text}), 0),
            Action::ScheduleFollowup { when } => {
                (TaskType::SendReminder, serde_json::json!({"followup_at": when}), 0)
            }
            Action::GenerateDocument { kind } => (
                TaskType::GenerateLetterAi,
                serde_json::json!({"kind": kind, "aggregate_id": event.aggregate_id, "tenant_id": event.tenant}),
                0,
            ),
        })
    }
}
