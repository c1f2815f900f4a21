//! The in-process Event Bus (§2, §4.2): ordered delivery of committed
//! domain events to interested engines. Backed by a broadcast channel so
//! the State Machine, Trigger Engine, and Deadline Tracker can each
//! subscribe independently; delivery order matches commit (staged) order
//! because the Gateway publishes only after a transaction commits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::domain::ids::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateType {
    Client,
    CreditReport,
    DisputeItem,
    Letter,
    LetterBatch,
    Deadline,
    Task,
    Payment,
}

/// Append-only log entry. `sequence` is dense within an aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: uuid::Uuid,
    pub tenant: TenantId,
    pub aggregate_type: AggregateType,
    pub aggregate_id: uuid::Uuid,
    pub event_type: String,
    pub sequence: u64,
    pub commit_ts: DateTime<Utc>,
    pub payload: Value,
}

/// Ordered, at-least-once fan-out to in-process subscribers. The Gateway is
/// the only publisher; subscribers never write back to the bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Publishes events from one committed transaction, in staged order.
    /// Errors (no subscribers) are not fatal: the durable log already has
    /// the events, and subscribers that start later rebuild via replay.
    pub fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            if self.sender.send(event).is_err() {
                tracing::debug!("event bus has no subscribers");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
