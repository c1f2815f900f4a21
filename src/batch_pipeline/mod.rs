//! §4.8 Batch Letter Pipeline: exclusive writer of `LetterBatch` and of
//! tracking-driven `Letter` status transitions (`queued -> sent ->
//! delivered`). Groups approved letters into SFTP batches, ingests
//! acknowledgements and tracking updates, and closes the loop back into
//! the state machine by emitting `letter.delivered`.

use sha2::{Digest, Sha256};

use crate::domain::ids::{LetterBatchId, LetterId, TenantId};
use crate::domain::{BatchStatus, Letter, LetterBatch, LetterStatus};
use crate::error::{CoreError, CoreResult};
use crate::events::AggregateType;
use crate::persistence::{Gateway, Store};

pub struct BatchLetterPipeline {
    gateway: Gateway,
    letter_cost_minor: i64,
}

impl BatchLetterPipeline {
    pub fn new(gateway: Gateway, letter_cost_minor: i64) -> Self {
        Self { gateway, letter_cost_minor }
    }

    fn store(&self) -> &Store {
        self.gateway.store()
    }

    fn letter_key(id: LetterId) -> String {
        format!("letter:{id}")
    }

    fn batch_key(id: LetterBatchId) -> String {
        format!("letter_batch:{id}")
    }

    /// Groups a set of `approved` letters into a new draft batch. §4.8:
    /// at most one active upload per tenant; additional approvals queue
    /// into a new draft rather than joining an in-flight upload.
    pub fn draft_batch(&self, tenant_id: TenantId, letter_ids: Vec<LetterId>) -> CoreResult<LetterBatch> {
        let mut letters = Vec::with_capacity(letter_ids.len());
        for id in &letter_ids {
            let letter: Letter = self
                .store()
                .get(&Self::letter_key(*id))?
                .ok_or_else(|| CoreError::NotFound(format!("letter {id} not found")))?;
            if letter.status != LetterStatus::Approved {
                return Err(CoreError::Conflict(format!(
                    "letter {id} is not approved; batch invariant (3) §3 requires approved letters only"
                )));
            }
            letters.push(letter);
        }

        let cost = self.letter_cost_minor * letters.len() as i64;
        let batch = LetterBatch::new_draft(tenant_id, letter_ids.clone(), cost);
        self.store().put(&Self::batch_key(batch.id), &batch)?;

        for mut letter in letters {
            letter.batch_id = Some(batch.id);
            self.store().put(&Self::letter_key(letter.id), &letter)?;
        }
        Ok(batch)
    }

    /// Builds the CSV manifest (bit-exact column order, §6) over the
    /// batch's letters, given their resolved recipient details.
    pub fn build_manifest_csv(&self, batch: &LetterBatch, rows: &[ManifestRow]) -> String {
        let mut out = String::from(
            "batch_id,letter_id,recipient_name,recipient_address1,recipient_city,recipient_state,recipient_zip,service_class,return_address_id,document_filename,sha256\n",
        );
        for row in rows {
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{}\n",
                batch.id,
                row.letter_id,
                row.recipient_name,
                row.recipient_address1,
                row.recipient_city,
                row.recipient_state,
                row.recipient_zip,
                row.service_class,
                row.return_address_id,
                row.document_filename,
                row.sha256_hex,
            ));
        }
        out
    }

    pub fn manifest_sha256(manifest_csv: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(manifest_csv.as_bytes());
        hasher.finalize().into()
    }

    /// Marks a batch `uploaded` after a successful SFTP put. Caller
    /// (the `upload_batch_sftp` task handler) supplies the manifest hash
    /// and remote filenames once the adapter confirms the atomic rename.
    pub fn mark_uploaded(&self, batch_id: LetterBatchId, manifest_sha256: [u8; 32], remote_filenames: Vec<String>) -> CoreResult<LetterBatch> {
        let mut batch: LetterBatch = self
            .store()
            .get(&Self::batch_key(batch_id))?
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id} not found")))?;
        batch.status = BatchStatus::Uploaded;
        batch.manifest_sha256 = manifest_sha256;
        batch.remote_filenames = remote_filenames;
        self.store().put(&Self::batch_key(batch_id), &batch)?;

        for letter_id in batch.letter_ids.clone() {
            if let Some(mut letter) = self.store().get::<Letter>(&Self::letter_key(letter_id))? {
                letter.status = LetterStatus::Queued;
                self.store().put(&Self::letter_key(letter_id), &letter)?;
            }
        }
        Ok(batch)
    }

    /// Ingests `ACK-{batch_id}.csv`. A partial-upload mismatch (fewer ack
    /// rows than letters, or any row missing) moves the batch to `failed`
    /// and reverts its letters back to `approved`; staff is alerted via a
    /// `send_reminder`-class task raised by the caller. A re-approval of
    /// the same letters must mint a new batch id, never reuse the failed one.
    pub fn ingest_ack(&self, batch_id: LetterBatchId, ack_rows: &[AckRow]) -> CoreResult<BatchStatus> {
        let mut batch: LetterBatch = self
            .store()
            .get(&Self::batch_key(batch_id))?
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id} not found")))?;

        let acked: std::collections::HashMap<LetterId, &AckRow> = ack_rows.iter().map(|r| (r.letter_id, r)).collect();
        let complete = batch.letter_ids.iter().all(|id| acked.contains_key(id));

        if !complete {
            batch.status = BatchStatus::Failed;
            self.store().put(&Self::batch_key(batch_id), &batch)?;
            for letter_id in batch.letter_ids.clone() {
                if let Some(mut letter) = self.store().get::<Letter>(&Self::letter_key(letter_id))? {
                    letter.status = LetterStatus::Approved;
                    letter.batch_id = None;
                    self.store().put(&Self::letter_key(letter_id), &letter)?;
                }
            }
            self.gateway.run(batch.tenant_id, batch_id.0, move |tx| {
                tx.stage_event(AggregateType::LetterBatch, "batch.failed", &serde_json::json!({}))
            })?;
            return Ok(BatchStatus::Failed);
        }

        batch.status = BatchStatus::Acknowledged;
        self.store().put(&Self::batch_key(batch_id), &batch)?;
        for letter_id in batch.letter_ids.clone() {
            if let Some(row) = acked.get(&letter_id) {
                if let Some(mut letter) = self.store().get::<Letter>(&Self::letter_key(letter_id))? {
                    letter.status = match row.status.as_str() {
                        "ACCEPTED" => LetterStatus::Queued,
                        "REJECTED" => LetterStatus::Undeliverable,
                        other => return Err(CoreError::Internal(format!("unknown ack status {other}"))),
                    };
                    letter.tracking_number = Some(row.tracking_number.clone());
                    self.store().put(&Self::letter_key(letter_id), &letter)?;
                }
            }
        }
        Ok(BatchStatus::Acknowledged)
    }

    /// Applies a daily `TRACK-{yyyymmdd}.csv` row, driving
    /// `queued -> sent -> delivered`. `delivered` is the event that lets
    /// the Deadline Tracker open the §611 30-day response window.
    pub fn apply_tracking_event(&self, tracking_number: &str, event_ts: chrono::DateTime<chrono::Utc>, event_code: &str) -> CoreResult<Option<Letter>> {
        let letters: Vec<Letter> = self.store().scan_prefix("letter:")?;
        let Some(mut letter) = letters.into_iter().find(|l| l.tracking_number.as_deref() == Some(tracking_number)) else {
            return Ok(None);
        };

        letter.status = match event_code {
            "IN_TRANSIT" | "OUT_FOR_DELIVERY" => LetterStatus::Sent,
            "DELIVERED" => {
                letter.delivered_at = Some(event_ts);
                LetterStatus::Delivered
            }
            "RETURNED" => LetterStatus::Returned,
            other => return Err(CoreError::Internal(format!("unknown tracking event code {other}"))),
        };
        self.store().put(&Self::letter_key(letter.id), &letter)?;

        if letter.status == LetterStatus::Delivered {
            let letter_id = letter.id;
            self.gateway.run(letter.tenant_id, letter.id.0, move |tx| {
                tx.stage_event(AggregateType::Letter, "letter.delivered", &serde_json::json!({"letter_id": letter_id}))
            })?;
        }
        Ok(Some(letter))
    }
}

pub struct ManifestRow {
    pub letter_id: LetterId,
    pub recipient_name: String,
    pub recipient_address1: String,
    pub recipient_city: String,
    pub recipient_state: String,
    pub recipient_zip: String,
    pub service_class: String,
    pub return_address_id: String,
    pub document_filename: String,
    pub sha256_hex: String,
}

pub struct AckRow {
    pub letter_id: LetterId,
    pub tracking_number: String,
    pub status: String,
}
