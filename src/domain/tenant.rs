use serde::{Deserialize, Serialize};

use super::ids::TenantId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub max_clients: u32,
    pub max_users: u32,
    pub letter_cost_minor: i64,
}
