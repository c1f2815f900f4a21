use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::{ClientId, CreditReportId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bureau {
    Equifax,
    Experian,
    TransUnion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradelineAccount {
    pub account_number: String,
    pub furnisher_name: String,
    /// 24 months of per-bureau payment history, newest first.
    pub payment_history: HashMap<Bureau, Vec<PaymentHistoryEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentHistoryEntry {
    pub month: chrono::NaiveDate,
    pub status_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inquiry {
    pub bureau: Bureau,
    pub inquired_at: DateTime<Utc>,
    pub creditor_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicRecord {
    pub bureau: Bureau,
    pub kind: String,
    pub filed_at: DateTime<Utc>,
}

/// A parsed credit report. Never mutated after commit; newest in the
/// per-client sequence wins. Accounts are deduplicated by account number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReport {
    pub id: CreditReportId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub pulled_at: DateTime<Utc>,
    pub scores: HashMap<Bureau, u16>,
    pub accounts: Vec<TradelineAccount>,
    pub inquiries: Vec<Inquiry>,
    pub public_records: Vec<PublicRecord>,
}

impl CreditReport {
    /// Deduplicates accounts by account number, keeping the first occurrence.
    pub fn dedupe_accounts(mut accounts: Vec<TradelineAccount>) -> Vec<TradelineAccount> {
        let mut seen = std::collections::HashSet::new();
        accounts.retain(|a| seen.insert(a.account_number.clone()));
        accounts
    }
}
