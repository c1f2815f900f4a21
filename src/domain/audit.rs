use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AuditLogId, TenantId};

/// Append-only record of every privileged action, carrying before/after
/// hashes rather than full payloads so PII never lands in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: AuditLogId,
    pub tenant_id: TenantId,
    pub actor: String,
    pub resource: String,
    pub before_sha256: Option<[u8; 32]>,
    pub after_sha256: [u8; 32],
    pub recorded_at: DateTime<Utc>,
}
