use serde::{Deserialize, Serialize};

use super::ids::{ClientId, PaymentId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentKind {
    Analysis,
    Round,
    SettlementFee,
    Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Held,
    Captured,
    Refunded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub kind: PaymentKind,
    pub amount_minor: i64,
    pub status: PaymentStatus,
    pub provider_ref: String,
}
