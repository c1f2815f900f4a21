use serde::{Deserialize, Serialize};

use super::ids::{LetterBatchId, LetterId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Draft,
    Uploaded,
    Acknowledged,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterBatch {
    pub id: LetterBatchId,
    pub tenant_id: TenantId,
    pub status: BatchStatus,
    pub manifest_sha256: [u8; 32],
    pub cost_minor: i64,
    pub letter_ids: Vec<LetterId>,
    pub remote_filenames: Vec<String>,
    /// Cursor into the tracking-ingest stream; advances as `TRACK-*.csv` files
    /// are consumed so a re-run of the daily poll does not reprocess rows.
    pub tracking_cursor: u64,
}

impl LetterBatch {
    pub fn new_draft(tenant_id: TenantId, letter_ids: Vec<LetterId>, cost_minor: i64) -> Self {
        Self {
            id: LetterBatchId::new(),
            tenant_id,
            status: BatchStatus::Draft,
            manifest_sha256: [0u8; 32],
            cost_minor,
            letter_ids,
            remote_filenames: Vec::new(),
            tracking_cursor: 0,
        }
    }
}
