use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credit_report::Bureau;
use super::ids::{ClientId, LetterBatchId, LetterId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterKind {
    Round1,
    Round2,
    Round3,
    Round4,
    Mov,
    Freeze,
    Validation,
    Block605b,
    CfpbComplaint,
    Demand,
    PreArb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterStatus {
    PendingApproval,
    Approved,
    Queued,
    Sent,
    Delivered,
    Returned,
    Undeliverable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Bureau(Bureau),
    Furnisher,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Letter {
    pub id: LetterId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub round: u8,
    pub kind: LetterKind,
    pub recipient: Recipient,
    pub status: LetterStatus,
    pub tracking_number: Option<String>,
    pub batch_id: Option<LetterBatchId>,
    pub content_sha256: [u8; 32],
    pub delivered_at: Option<DateTime<Utc>>,
}
