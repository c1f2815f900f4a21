use serde::{Deserialize, Serialize};

use super::credit_report::Bureau;
use super::ids::{ClientId, DisputeItemId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeStatus {
    Pending,
    Disputed,
    Verified,
    Deleted,
    Reinserted,
    Resolved,
}

/// Escalation ladder: §611 (initial dispute) -> §623 (furnisher duties) ->
/// §621 (regulatory referral) -> §616/617 (civil liability / demand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EscalationStage {
    Section611,
    Section623,
    Section621,
    Section616or617,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeItem {
    pub id: DisputeItemId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub account_number: String,
    pub bureau: Bureau,
    pub round: u8,
    pub status: DisputeStatus,
    pub escalation_stage: EscalationStage,
    pub estimated_impact_points: i16,
}
