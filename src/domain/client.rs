use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ClientId, TenantId};

/// Client lifecycle stage. Ordered and monotone unless a staff override resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleStage {
    Lead,
    AnalysisPaid,
    Onboarding,
    Active,
    Dormant,
    Closed,
}

/// CROA (Credit Repair Organizations Act) cancellation-hold state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CroaState {
    NotSigned,
    Holding { cancellation_period_end: DateTime<Utc> },
    Cleared,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub tenant_id: TenantId,
    pub lifecycle_stage: LifecycleStage,
    /// PII, encrypted at rest by the persistence gateway before this struct is serialized.
    pub encrypted_pii: Vec<u8>,
    /// Bureau credentials, encrypted at rest.
    pub encrypted_bureau_credentials: Vec<u8>,
    pub current_round: u8,
    pub croa_state: CroaState,
    pub credit_monitoring_provider: Option<String>,
    pub card_on_file_token: Option<String>,
    pub version: u64,
}

impl Client {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            id: ClientId::new(),
            tenant_id,
            lifecycle_stage: LifecycleStage::Lead,
            encrypted_pii: Vec::new(),
            encrypted_bureau_credentials: Vec::new(),
            current_round: 0,
            croa_state: CroaState::NotSigned,
            credit_monitoring_provider: None,
            card_on_file_token: None,
            version: 0,
        }
    }
}
