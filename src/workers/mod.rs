//! §5 concurrency model: parallel workers with cooperative suspension
//! points at every external I/O call and queue fetch, bounded by a
//! per-tenant concurrency cap (default 8) to protect external rate
//! limits. A worker that panics mid-task has its `JoinHandle` result
//! converted to `task.dead` rather than taking the process down — "only
//! the worker top level converts panics into task.dead" (§9).

use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::adapters::ai_writer::AiLetterRequest;
use crate::adapters::notifier::{Channel, NotificationRequest};
use crate::adapters::payment_gateway::CaptureRequest;
use crate::batch_pipeline::AckRow;
use crate::domain::ids::{ClientId, LetterBatchId, LetterId, TenantId};
use crate::domain::{Bureau, CreditReport, Letter, LetterKind, Recipient};
use crate::error::{AdapterError, CoreError, CoreResult};
use crate::orchestrator::Orchestrator;
use crate::task_queue::{Task, TaskType};

pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    tenant_semaphores: DashMap<TenantId, Arc<Semaphore>>,
    max_concurrency: usize,
}

impl WorkerPool {
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrency: usize) -> Self {
        Self { orchestrator, tenant_semaphores: DashMap::new(), max_concurrency }
    }

    fn semaphore_for(&self, tenant_id: TenantId) -> Arc<Semaphore> {
        self.tenant_semaphores
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_concurrency)))
            .clone()
    }

    /// Leases and dispatches one task, if any is ready. Returns whether a
    /// task was found, so the caller's poll loop can back off when idle.
    pub async fn run_once(&self, worker_id: &str) -> bool {
        let Ok(Some(task)) = self.orchestrator.task_queue.lease(worker_id, ChronoDuration::seconds(60)) else {
            return false;
        };

        let semaphore = self.semaphore_for(task.tenant_id);
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return false;
        };

        let orchestrator = self.orchestrator.clone();
        let task_id = task.id;
        let handle = tokio::spawn(async move { dispatch(&orchestrator, &task).await });

        match handle.await {
            Ok(Ok(())) => {
                if let Err(e) = self.orchestrator.task_queue.ack_success(task_id) {
                    error!(?e, "failed to ack task success");
                }
            }
            Ok(Err(e)) => {
                warn!(task_id = %task_id, error = %e, "task execution failed");
                if let Err(e) = self.orchestrator.task_queue.ack_failure(task_id, e.to_string()) {
                    error!(?e, "failed to ack task failure");
                }
            }
            Err(join_err) => {
                error!(task_id = %task_id, error = %join_err, "task panicked");
                let _ = self.orchestrator.task_queue.ack_failure(task_id, format!("panic: {join_err}"));
            }
        }
        true
    }
}

#[instrument(skip(orchestrator, task), fields(task_id = %task.id, task_type = ?task.task_type))]
async fn dispatch(orchestrator: &Orchestrator, task: &Task) -> CoreResult<()> {
    match task.task_type {
        TaskType::FireDeadline => {
            orchestrator.deadlines.fire_due()?;
        }
        TaskType::EvaluateTrigger => {
            info!("trigger evaluation is driven by the event bus subscriber, not a standalone task body");
        }
        TaskType::AdvanceRound => {
            info!("round advancement is driven by the state machine directly from domain events");
        }
        TaskType::UploadBatchSftp => upload_batch_sftp(orchestrator, task).await?,
        TaskType::PollTrackingSftp => poll_tracking_sftp(orchestrator, task).await?,
        TaskType::GenerateLetterAi => generate_letter_ai(orchestrator, task).await?,
        TaskType::ScrapeCreditReport => scrape_credit_report(orchestrator, task).await?,
        TaskType::CapturePayment => capture_payment(orchestrator, task).await?,
        TaskType::ReleasePaymentHold | TaskType::ExpireStaleHold => release_hold(orchestrator, task).await?,
        TaskType::SendEmail => send_notification(orchestrator, task, Channel::Email).await?,
        TaskType::SendSms => send_notification(orchestrator, task, Channel::Sms).await?,
        TaskType::SendPush => send_notification(orchestrator, task, Channel::Push).await?,
        TaskType::SendReminder => send_notification(orchestrator, task, Channel::Email).await?,
        TaskType::RunScheduledReport => run_scheduled_report(orchestrator, task)?,
    }
    Ok(())
}

fn field<'a>(task: &'a Task, name: &str) -> CoreResult<&'a str> {
    task.payload.get(name).and_then(|v| v.as_str()).ok_or_else(|| CoreError::Validation(format!("task payload missing `{name}`")))
}

async fn upload_batch_sftp(orchestrator: &Orchestrator, task: &Task) -> CoreResult<()> {
    let batch_id: LetterBatchId = field(task, "batch_id")?.parse().map_err(|_| CoreError::Validation("bad batch_id".into()))?;
    let batch: crate::domain::LetterBatch = orchestrator
        .store
        .get(&format!("letter_batch:{batch_id}"))?
        .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id} not found")))?;

    let mut rows = Vec::with_capacity(batch.letter_ids.len());
    for letter_id in &batch.letter_ids {
        let letter: Letter = orchestrator
            .store
            .get(&format!("letter:{letter_id}"))?
            .ok_or_else(|| CoreError::NotFound(format!("letter {letter_id} not found")))?;
        rows.push(manifest_row(&letter));
    }

    let manifest_csv = orchestrator.batch_pipeline.build_manifest_csv(&batch, &rows);
    let sha256 = crate::batch_pipeline::BatchLetterPipeline::manifest_sha256(&manifest_csv);
    let remote_name = format!("BATCH-{batch_id}.csv");
    orchestrator.mail_sftp.put_atomic(&remote_name, manifest_csv.as_bytes()).await?;
    orchestrator.batch_pipeline.mark_uploaded(batch_id, sha256, vec![remote_name])?;
    Ok(())
}

/// Mailing details the manifest needs are not part of `Letter`/`Bureau`
/// themselves (§3); this is the static lookup the manifest row draws from.
fn bureau_address(bureau: Bureau) -> (&'static str, &'static str, &'static str, &'static str, &'static str) {
    match bureau {
        Bureau::Equifax => ("Equifax Information Services LLC", "P.O. Box 740256", "Atlanta", "GA", "30374"),
        Bureau::Experian => ("Experian", "P.O. Box 4500", "Allen", "TX", "75013"),
        Bureau::TransUnion => ("TransUnion Consumer Solutions", "P.O. Box 2000", "Chester", "PA", "19016"),
    }
}

fn manifest_row(letter: &Letter) -> crate::batch_pipeline::ManifestRow {
    let (name, addr1, city, state, zip) = match letter.recipient {
        Recipient::Bureau(b) => bureau_address(b),
        Recipient::Furnisher => ("Furnisher", "", "", "", ""),
    };
    crate::batch_pipeline::ManifestRow {
        letter_id: letter.id,
        recipient_name: name.to_string(),
        recipient_address1: addr1.to_string(),
        recipient_city: city.to_string(),
        recipient_state: state.to_string(),
        recipient_zip: zip.to_string(),
        service_class: "certified_mail".to_string(),
        return_address_id: "default".to_string(),
        document_filename: format!("{}.pdf", letter.id),
        sha256_hex: hex::encode(letter.content_sha256),
    }
}

/// No separate ack-polling task type exists in the closed set, so this one
/// task handles both ack ingestion and daily tracking-manifest ingestion.
async fn poll_tracking_sftp(orchestrator: &Orchestrator, _task: &Task) -> CoreResult<()> {
    for name in orchestrator.mail_sftp.list_ack_files().await? {
        let Some(batch_id) = name.strip_prefix("ACK-").and_then(|s| s.strip_suffix(".csv")).and_then(|s| s.parse::<LetterBatchId>().ok())
        else {
            warn!(file = %name, "skipping malformed ack filename");
            continue;
        };
        let contents = orchestrator.mail_sftp.fetch(&name).await?;
        let text = String::from_utf8_lossy(&contents);
        let rows = parse_ack_rows(&text);
        orchestrator.batch_pipeline.ingest_ack(batch_id, &rows)?;
    }

    for name in orchestrator.mail_sftp.fetch_tracking_manifests().await? {
        let contents = orchestrator.mail_sftp.fetch(&name).await?;
        let text = String::from_utf8_lossy(&contents);
        for (tracking_number, event_ts, event_code) in parse_tracking_rows(&text) {
            orchestrator.batch_pipeline.apply_tracking_event(&tracking_number, event_ts, &event_code)?;
        }
    }
    Ok(())
}

fn parse_ack_rows(csv: &str) -> Vec<AckRow> {
    csv.lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.splitn(3, ',');
            let letter_id: LetterId = cols.next()?.trim().parse().ok()?;
            let tracking_number = cols.next()?.trim().to_string();
            let status = cols.next()?.trim().to_string();
            Some(AckRow { letter_id, tracking_number, status })
        })
        .collect()
}

fn parse_tracking_rows(csv: &str) -> Vec<(String, chrono::DateTime<chrono::Utc>, String)> {
    csv.lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.splitn(3, ',');
            let tracking_number = cols.next()?.trim().to_string();
            let event_ts: chrono::DateTime<chrono::Utc> = cols.next()?.trim().parse().ok()?;
            let event_code = cols.next()?.trim().to_string();
            Some((tracking_number, event_ts, event_code))
        })
        .collect()
}

fn letter_kind_from_str(kind: &str) -> LetterKind {
    match kind {
        "605b_letter" => LetterKind::Block605b,
        "regulatory_complaint" => LetterKind::CfpbComplaint,
        "round1" => LetterKind::Round1,
        "round2" => LetterKind::Round2,
        "round3" => LetterKind::Round3,
        "round4" => LetterKind::Round4,
        "mov" => LetterKind::Mov,
        "freeze" => LetterKind::Freeze,
        "demand" => LetterKind::Demand,
        "prearb" => LetterKind::PreArb,
        _ => LetterKind::Validation,
    }
}

async fn generate_letter_ai(orchestrator: &Orchestrator, task: &Task) -> CoreResult<()> {
    let kind = field(task, "kind")?;
    let round = task.payload.get("round").and_then(|v| v.as_u64()).unwrap_or(0) as u8;
    let request = AiLetterRequest {
        client_snapshot: task.payload.clone(),
        round,
        recipient_bureau: None,
        kind: letter_kind_from_str(kind),
    };
    let response = orchestrator.ai_writer.generate_letter(request).await?;
    info!(tokens_used = response.tokens_used, "letter generated");
    Ok(())
}

async fn scrape_credit_report(orchestrator: &Orchestrator, task: &Task) -> CoreResult<()> {
    let client_id: ClientId = field(task, "client_id")?.parse().map_err(|_| CoreError::Validation("bad client_id".into()))?;
    let provider = field(task, "provider")?;
    let credentials_ref = field(task, "credentials_ref")?;

    let report: CreditReport = orchestrator.scraper.scrape(provider, credentials_ref.as_bytes()).await?;
    orchestrator.store.put(&format!("credit_report:{}", report.id), &report)?;
    orchestrator.deadlines.on_report_pulled(task.tenant_id, client_id.0, report.pulled_at)?;
    Ok(())
}

async fn capture_payment(orchestrator: &Orchestrator, task: &Task) -> CoreResult<()> {
    let client_id: ClientId = field(task, "client_id")?.parse().map_err(|_| CoreError::Validation("bad client_id".into()))?;
    let idempotency_key = field(task, "idempotency_key")?.to_string();
    let amount_minor = task.payload.get("amount_minor").and_then(|v| v.as_i64()).ok_or_else(|| CoreError::Validation("missing amount_minor".into()))?;
    let card_on_file_token = field(task, "card_on_file_token")?.to_string();

    match orchestrator.payment_gateway.capture(CaptureRequest { idempotency_key, amount_minor, card_on_file_token }).await {
        Ok(response) => {
            let payment = crate::domain::Payment {
                id: crate::domain::ids::PaymentId::new(),
                tenant_id: task.tenant_id,
                client_id,
                kind: crate::domain::PaymentKind::Round,
                amount_minor: response.captured_minor,
                status: crate::domain::PaymentStatus::Captured,
                provider_ref: response.provider_ref,
            };
            orchestrator.store.put(&format!("payment:{}", payment.id), &payment)?;
            orchestrator.state_machine.on_croa_hold_cleared(client_id, true)?;
        }
        Err(AdapterError::Permanent(reason)) => {
            warn!(reason, "payment declined");
            orchestrator.state_machine.on_croa_hold_cleared(client_id, false)?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn release_hold(orchestrator: &Orchestrator, task: &Task) -> CoreResult<()> {
    let provider_ref = field(task, "provider_ref")?;
    orchestrator.payment_gateway.release_hold(provider_ref).await?;
    Ok(())
}

async fn send_notification(orchestrator: &Orchestrator, task: &Task, channel: Channel) -> CoreResult<()> {
    let template_id = field(task, "template")?.to_string();
    let recipient = field(task, "to")?.to_string();
    let request = NotificationRequest { template_id, recipient, variables: task.payload.clone() };
    orchestrator.notifier.send(channel, request).await?;
    Ok(())
}

/// Not adapter-bound: counts tasks left in the dead-letter state as a
/// minimal stand-in for the operational report this would actually compile.
fn run_scheduled_report(orchestrator: &Orchestrator, task: &Task) -> CoreResult<()> {
    let dead_count = orchestrator
        .store
        .scan_prefix::<Task>("task:")?
        .into_iter()
        .filter(|t| t.tenant_id == task.tenant_id && t.state == crate::task_queue::TaskState::Dead)
        .count();
    info!(tenant_id = %task.tenant_id, dead_count, "scheduled report run");
    Ok(())
}
