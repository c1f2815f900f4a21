//! Wires the Persistence Gateway, Task Queue, Scheduler, Trigger Engine,
//! Dispute Round State Machine, Deadline Tracker, and Batch Pipeline
//! together behind the small command surface §6 describes. Staff/portal
//! consoles call through here; so do the background workers.

use std::sync::Arc;

use crate::adapters::ai_writer::{AiWriter, HttpAiWriter};
use crate::adapters::mail_sftp::{FilesystemSftp, MailSftp};
use crate::adapters::notifier::{HttpNotifier, Notifier};
use crate::adapters::payment_gateway::{HttpPaymentGateway, PaymentGateway};
use crate::adapters::scraper::{CreditScraper, HttpCreditScraper};
use crate::api::ClientStatusResponse;
use crate::batch_pipeline::BatchLetterPipeline;
use crate::clock::Clock;
use crate::config::Config;
use crate::deadlines::DeadlineTracker;
use crate::domain::ids::{ClientId, LetterBatchId, TaskId, TenantId, TriggerId};
use crate::domain::{BatchStatus, DeadlineKind, Letter};
use crate::error::{CoreError, CoreResult};
use crate::events::{DomainEvent, EventBus};
use crate::persistence::{Gateway, Store};
use crate::state_machine::DisputeStateMachine;
use crate::task_queue::{TaskQueue, TaskType};
use crate::triggers::{Action, ClientSnapshot, Condition, TriggerEngine, WorkflowTrigger};

pub struct Orchestrator {
    pub store: Store,
    pub bus: EventBus,
    pub gateway: Gateway,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
    pub task_queue: TaskQueue,
    pub state_machine: DisputeStateMachine,
    pub deadlines: DeadlineTracker,
    pub batch_pipeline: BatchLetterPipeline,
    pub triggers: TriggerEngine,
    pub mail_sftp: Arc<dyn MailSftp>,
    pub scraper: Arc<dyn CreditScraper>,
    pub ai_writer: Arc<dyn AiWriter>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    seen_webhook_events: dashmap::DashSet<String>,
}

impl Orchestrator {
    pub fn new(store: Store, clock: Arc<dyn Clock>, config: Config) -> Self {
        let bus = EventBus::default();
        let gateway = Gateway::new(store.clone(), bus.clone(), clock.clone());
        let task_queue = TaskQueue::new(gateway.clone(), clock.clone(), config.task_backoff_base_s, config.task_backoff_cap_s);
        let state_machine = DisputeStateMachine::new(gateway.clone());
        let deadlines = DeadlineTracker::new(gateway.clone(), clock.clone());
        let batch_pipeline = BatchLetterPipeline::new(gateway.clone(), config.letter_cost_minor);
        let triggers = TriggerEngine::new(store.clone(), task_queue.clone());

        let mail_sftp: Arc<dyn MailSftp> = Arc::new(FilesystemSftp::new(config.sftp_host.clone()));
        let scraper: Arc<dyn CreditScraper> = Arc::new(HttpCreditScraper::new(config.scraper_endpoint.clone()));
        let ai_writer: Arc<dyn AiWriter> = Arc::new(HttpAiWriter::new(config.ai_endpoint.clone(), config.ai_budget_tokens));
        let payment_gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(config.payment_endpoint.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(config.notifier_endpoint.clone()));

        let orchestrator = Self {
            store,
            bus,
            gateway,
            clock,
            config,
            task_queue,
            state_machine,
            deadlines,
            batch_pipeline,
            triggers,
            mail_sftp,
            scraper,
            ai_writer,
            payment_gateway,
            notifier,
            seen_webhook_events: dashmap::DashSet::new(),
        };
        orchestrator.seed_default_triggers().expect("default triggers are well-formed");
        orchestrator
    }

    pub fn webhook_secret(&self) -> &str {
        &self.config.payment_webhook_secret
    }

    /// Registers the triggers this core ships with out of the box: an
    /// overdue-escalation deadline firing generates a regulatory complaint
    /// letter, and a reinsertion detection generates the §611(a)(5)(B)
    /// notice letter. Scoped to a nil tenant since `TriggerEngine::handle`
    /// does not filter by tenant — matching every tenant's events.
    fn seed_default_triggers(&self) -> CoreResult<()> {
        let tenant_id = TenantId(uuid::Uuid::nil());
        self.triggers.register(WorkflowTrigger {
            id: TriggerId::new(),
            tenant_id,
            event_type: "deadline.fired".to_string(),
            condition: Condition::EventFieldEquals { field: "kind".into(), value: serde_json::json!("OverdueEscalation") },
            action: Action::GenerateDocument { kind: "regulatory_complaint".into() },
            priority: 0,
            enabled: true,
        })?;
        self.triggers.register(WorkflowTrigger {
            id: TriggerId::new(),
            tenant_id,
            event_type: "reinsertion.detected".to_string(),
            condition: Condition::Always,
            action: Action::GenerateDocument { kind: "605b_letter".into() },
            priority: 0,
            enabled: true,
        })?;
        Ok(())
    }

    /// Subscriber-side half of the event bus (§2): routes every committed
    /// domain event into the engines that react to it automatically, and
    /// into the trigger engine regardless of type.
    pub fn route_event(&self, event: &DomainEvent) -> CoreResult<()> {
        match event.event_type.as_str() {
            "croa.signed" => {
                let signed_at = event
                    .payload
                    .get("signed_at")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or(event.commit_ts);
                self.deadlines.on_croa_signed(event.tenant, event.aggregate_id, signed_at)?;
            }
            "letter.delivered" => {
                self.deadlines.on_letter_delivered(event.tenant, event.aggregate_id, event.commit_ts)?;
            }
            "deadline.fired" => self.route_deadline_fired(event)?,
            _ => {}
        }
        self.triggers.handle(event, &ClientSnapshot::default())?;
        Ok(())
    }

    fn route_deadline_fired(&self, event: &DomainEvent) -> CoreResult<()> {
        let kind: Option<DeadlineKind> = event.payload.get("kind").and_then(|v| serde_json::from_value(v.clone()).ok());
        if kind != Some(DeadlineKind::OverdueEscalation) {
            return Ok(());
        }
        let Some(letter_id) = event.payload.get("parent_id").and_then(|v| serde_json::from_value::<uuid::Uuid>(v.clone()).ok())
        else {
            return Ok(());
        };
        if let Some(letter) = self.store.get::<Letter>(&format!("letter:{letter_id}"))? {
            self.state_machine.on_responses_gathered(letter.client_id, letter.round, true)?;
        }
        Ok(())
    }

    /// Registers a client aggregate. Client intake itself (lead capture,
    /// PII collection) is CRUD glue outside this core's scope (§1); this
    /// exists so the core has something to attach dispute state to.
    pub fn create_client(&self, tenant_id: crate::domain::ids::TenantId) -> CoreResult<crate::domain::Client> {
        let client = crate::domain::Client::new(tenant_id);
        self.store.put(&format!("client:{}", client.id), &client)?;
        self.state_machine.load_or_init(tenant_id, client.id)?;
        Ok(client)
    }

    /// `POST /commands/dispute/{clientId}/advance-round`.
    pub fn command_advance_round(
        &self,
        client_id: ClientId,
        round: u8,
        approved_batch_id: Option<LetterBatchId>,
    ) -> CoreResult<crate::state_machine::RoundState> {
        if let Some(batch_id) = approved_batch_id {
            let batch = self.store.get::<crate::domain::LetterBatch>(&format!("letter_batch:{batch_id}"))?;
            match batch {
                Some(b) if b.status == BatchStatus::Uploaded => {
                    let state = self.state_machine.on_batch_uploaded(client_id, round)?;
                    return Ok(state.state);
                }
                Some(_) => return Err(CoreError::Conflict("batch is not uploaded".into())),
                None => return Err(CoreError::NotFound(format!("batch {batch_id} not found"))),
            }
        }
        let state = self.state_machine.on_round_advance(client_id, round)?;
        Ok(state.state)
    }

    /// `POST /commands/letters/batch/{batchId}/approve`: transitions
    /// `draft -> uploaded` by enqueuing `upload_batch_sftp`.
    pub fn command_approve_batch(&self, batch_id: LetterBatchId) -> CoreResult<TaskId> {
        let batch: crate::domain::LetterBatch = self
            .store
            .get(&format!("letter_batch:{batch_id}"))?
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id} not found")))?;
        if batch.status != BatchStatus::Draft {
            return Err(CoreError::Conflict(format!("batch {batch_id} is not draft")));
        }
        let idem_key = format!("approve_batch:{batch_id}");
        self.task_queue.enqueue(
            batch.tenant_id,
            TaskType::UploadBatchSftp,
            serde_json::json!({"batch_id": batch_id}),
            self.clock.now(),
            &idem_key,
            5,
        )
    }

    /// `POST /commands/credit-report/import`.
    pub fn command_import_credit_report(&self, client_id: ClientId, provider: &str, credentials_ref: &str) -> CoreResult<TaskId> {
        let client: crate::domain::Client = self
            .store
            .get(&format!("client:{client_id}"))?
            .ok_or_else(|| CoreError::NotFound(format!("client {client_id} not found")))?;
        let idem_key = format!("scrape:{client_id}:{provider}");
        self.task_queue.enqueue(
            client.tenant_id,
            TaskType::ScrapeCreditReport,
            serde_json::json!({"client_id": client_id, "provider": provider, "credentials_ref": credentials_ref}),
            self.clock.now(),
            &idem_key,
            5,
        )
    }

    /// `POST /webhooks/payments`. Replay-safe: a provider event id is
    /// processed at most once, regardless of delivery count (§8 scenario 5).
    pub fn command_payment_webhook(&self, provider_event_id: &str, client_id: ClientId, event_type: &str, amount_minor: i64) -> CoreResult<()> {
        if !self.seen_webhook_events.insert(provider_event_id.to_string()) {
            return Ok(());
        }

        if event_type == "payment.captured" {
            let client: crate::domain::Client = self
                .store
                .get(&format!("client:{client_id}"))?
                .ok_or_else(|| CoreError::NotFound(format!("client {client_id} not found")))?;
            let payment = crate::domain::Payment {
                id: crate::domain::ids::PaymentId::new(),
                tenant_id: client.tenant_id,
                client_id,
                kind: crate::domain::PaymentKind::Round,
                amount_minor,
                status: crate::domain::PaymentStatus::Captured,
                provider_ref: provider_event_id.to_string(),
            };
            self.store.put(&format!("payment:{}", payment.id), &payment)?;
            self.state_machine.on_croa_hold_cleared(client_id, true)?;

            let audit = crate::domain::AuditLog {
                id: crate::domain::ids::AuditLogId::new(),
                tenant_id: client.tenant_id,
                actor: "payment_webhook".to_string(),
                resource: format!("client:{client_id}"),
                before_sha256: None,
                after_sha256: [0u8; 32],
                recorded_at: self.clock.now(),
            };
            self.store.put(&format!("audit:{}", audit.id), &audit)?;
        }
        Ok(())
    }

    /// `GET /status/client/{id}`.
    pub fn query_client_status(&self, client_id: ClientId) -> CoreResult<ClientStatusResponse> {
        let dispute = self.state_machine.get(client_id)?;
        Ok(ClientStatusResponse {
            client_id,
            state: format!("{:?}", dispute.state),
            current_round: dispute.state.round().unwrap_or(0),
        })
    }

    /// Runs one Scheduler tick plus one pending Deadline sweep; called in a
    /// loop by the binary, and directly by integration tests to avoid
    /// depending on wall-clock sleeps.
    pub fn drive_time_forward(&self, scheduler: &crate::scheduler::Scheduler) -> CoreResult<()> {
        scheduler.tick()?;
        self.deadlines.fire_due()?;
        Ok(())
    }
}

pub fn default_config_with_business_days(year_range: std::ops::RangeInclusive<i32>) -> Vec<chrono::NaiveDate> {
    year_range.flat_map(Config::federal_holidays).collect()
}
