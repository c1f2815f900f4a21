use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ids::{TaskId, TenantId};

/// The closed set of task types (§4.3). No task type may be added ad hoc —
/// new behavior is modeled as a new variant here plus a handler, matching
/// the "closed-set" discipline the trigger engine also follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    SendEmail,
    SendSms,
    SendPush,
    GenerateLetterAi,
    ScrapeCreditReport,
    UploadBatchSftp,
    PollTrackingSftp,
    CapturePayment,
    ReleasePaymentHold,
    ExpireStaleHold,
    SendReminder,
    RunScheduledReport,
    EvaluateTrigger,
    AdvanceRound,
    FireDeadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Ready,
    Running,
    Succeeded,
    Failed,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub task_type: TaskType,
    pub payload: Value,
    pub run_at: DateTime<Utc>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub state: TaskState,
    pub last_error: Option<String>,
    pub idempotency_key: String,
    pub leased_by: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn idempotency_storage_key(task_type: TaskType, idempotency_key: &str) -> String {
        format!("task_idem:{task_type:?}:{idempotency_key}")
    }

    pub fn storage_key(id: TaskId) -> String {
        format!("task:{id}")
    }
}
