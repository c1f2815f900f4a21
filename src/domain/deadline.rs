use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DeadlineId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadlineKind {
    CroaHold,
    RoundResponse,
    OverdueEscalation,
    Obsolescence,
    ReinsertionNotice,
}

/// One row per actionable date. At most one unresolved deadline of a given
/// kind may exist per parent aggregate — enforced by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deadline {
    pub id: DeadlineId,
    pub tenant_id: TenantId,
    pub kind: DeadlineKind,
    /// The aggregate this deadline is attached to: a client, letter, or dispute item.
    pub parent_id: uuid::Uuid,
    pub due_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Deadline {
    pub fn is_unresolved(&self) -> bool {
        self.resolved_at.is_none()
    }
}
