use chrono::{TimeZone, Utc};
use chrono_tz::America::New_York;
use std::sync::Arc;

use dispute_core::clock::{Clock, TestClock};
use dispute_core::domain::ids::TenantId;
use dispute_core::events::EventBus;
use dispute_core::persistence::{Gateway, Store};
use dispute_core::scheduler::Scheduler;
use dispute_core::task_queue::{TaskQueue, TaskType};
use dispute_core::triggers::{Action, ClientSnapshot, Condition, TriggerEngine, WorkflowTrigger};
use dispute_core::domain::ids::TriggerId;
use dispute_core::events::{AggregateType, DomainEvent};

fn clock_at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Arc<TestClock> {
    let at = New_York.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().with_timezone(&Utc);
    TestClock::new(at, New_York, vec![])
}

#[test]
fn enqueue_with_same_idempotency_key_returns_existing_task() {
    let clock = clock_at(2026, 1, 9, 9, 0);
    let store = Store::open_temporary().unwrap();
    let gateway = Gateway::new(store, EventBus::default(), clock.clone());
    let queue = TaskQueue::new(gateway, clock.clone(), 30, 3600);
    let tenant_id = TenantId::new();

    let first = queue
        .enqueue(tenant_id, TaskType::SendEmail, serde_json::json!({}), clock.now(), "evt_123", 5)
        .unwrap();
    let second = queue
        .enqueue(tenant_id, TaskType::SendEmail, serde_json::json!({}), clock.now(), "evt_123", 5)
        .unwrap();
    assert_eq!(first, second);

    // A different idempotency key must mint a distinct task.
    let third = queue
        .enqueue(tenant_id, TaskType::SendEmail, serde_json::json!({}), clock.now(), "evt_456", 5)
        .unwrap();
    assert_ne!(first, third);
}

#[test]
fn task_becomes_dead_after_exhausting_attempts() {
    let clock = clock_at(2026, 1, 9, 9, 0);
    let store = Store::open_temporary().unwrap();
    let gateway = Gateway::new(store, EventBus::default(), clock.clone());
    let queue = TaskQueue::new(gateway, clock.clone(), 30, 3600);
    let tenant_id = TenantId::new();

    let task_id = queue
        .enqueue(tenant_id, TaskType::ScrapeCreditReport, serde_json::json!({}), clock.now(), "scrape:1", 3)
        .unwrap();

    for _ in 0..3 {
        let leased = queue.lease("worker-1", chrono::Duration::seconds(60)).unwrap().unwrap();
        assert_eq!(leased.id, task_id);
        queue.ack_failure(task_id, "boom").unwrap();
        // Clear the backoff window (base 30s, cap 3600s with jitter) so the
        // next lease attempt can pick the task back up immediately.
        clock.advance(chrono::Duration::seconds(3600));
    }

    let task = queue.get(task_id).unwrap().unwrap();
    assert_eq!(task.state, dispute_core::task_queue::TaskState::Dead);
    assert_eq!(task.attempt, 3);

    // Dead tasks are never re-leased.
    assert!(queue.lease("worker-1", chrono::Duration::seconds(60)).unwrap().is_none());
}

#[test]
fn scheduler_cron_tick_materializes_exactly_one_task_per_fire() {
    // The cron expression is evaluated against the Clock's UTC timestamps
    // directly (the Scheduler does not localize), so the fixture times are
    // plain UTC rather than routed through America/New_York.
    let clock = TestClock::new(Utc.with_ymd_and_hms(2026, 1, 9, 13, 59, 0).unwrap(), chrono_tz::UTC, vec![]);
    let store = Store::open_temporary().unwrap();
    let gateway = Gateway::new(store.clone(), EventBus::default(), clock.clone());
    let queue = TaskQueue::new(gateway, clock.clone(), 30, 3600);
    let scheduler = Scheduler::new(store, queue.clone(), clock.clone());
    let tenant_id = TenantId::new();

    // Fires every day at 14:00 UTC.
    scheduler.register_cron(tenant_id, "0 0 14 * * *", TaskType::RunScheduledReport, serde_json::json!({})).unwrap();

    clock.set(Utc.with_ymd_and_hms(2026, 1, 9, 14, 0, 1).unwrap());
    let fired_first = scheduler.tick().unwrap();
    assert_eq!(fired_first, 1);

    // A second tick at the same moment must not re-fire.
    let fired_again = scheduler.tick().unwrap();
    assert_eq!(fired_again, 0);

    let leased = queue.lease("worker-1", chrono::Duration::seconds(60)).unwrap().expect("one task enqueued by the cron tick");
    assert_eq!(leased.task_type, TaskType::RunScheduledReport);
    assert!(queue.lease("worker-2", chrono::Duration::seconds(60)).unwrap().is_none());
}

#[test]
fn trigger_engine_enqueues_at_most_one_task_per_event_even_if_handled_twice() {
    let clock = clock_at(2026, 1, 9, 9, 0);
    let store = Store::open_temporary().unwrap();
    let gateway = Gateway::new(store.clone(), EventBus::default(), clock.clone());
    let queue = TaskQueue::new(gateway, clock.clone(), 30, 3600);
    let engine = TriggerEngine::new(store, queue.clone());
    let tenant_id = TenantId::new();

    let trigger = WorkflowTrigger {
        id: TriggerId::new(),
        tenant_id,
        event_type: "croa.signed".to_string(),
        condition: Condition::Always,
        action: Action::SendEmail { template: "croa_ack".into(), to: "client".into() },
        priority: 0,
        enabled: true,
    };
    engine.register(trigger).unwrap();

    let event = DomainEvent {
        id: uuid::Uuid::new_v4(),
        tenant: tenant_id,
        aggregate_type: AggregateType::Client,
        aggregate_id: uuid::Uuid::new_v4(),
        event_type: "croa.signed".to_string(),
        sequence: 1,
        commit_ts: clock.now(),
        payload: serde_json::json!({}),
    };
    let snapshot = ClientSnapshot::default();

    let first = engine.handle(&event, &snapshot).unwrap();
    let second = engine.handle(&event, &snapshot).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
}

#[test]
fn batch_manifest_csv_preserves_letter_ids_and_sha256() {
    use dispute_core::batch_pipeline::{BatchLetterPipeline, ManifestRow};
    use dispute_core::domain::ids::LetterId;
    use dispute_core::domain::LetterBatch;

    let batch = LetterBatch::new_draft(TenantId::new(), vec![LetterId::new()], 1100);
    let row = ManifestRow {
        letter_id: batch.letter_ids[0],
        recipient_name: "Equifax Information Services".into(),
        recipient_address1: "P.O. Box 740256".into(),
        recipient_city: "Atlanta".into(),
        recipient_state: "GA".into(),
        recipient_zip: "30374".into(),
        service_class: "certified".into(),
        return_address_id: "ra-1".into(),
        document_filename: "letter.pdf".into(),
        sha256_hex: "deadbeef".into(),
    };
    let csv = BatchLetterPipeline::build_manifest_csv(&unused_pipeline(), &batch, &[row]);
    let header = csv.lines().next().unwrap();
    assert_eq!(
        header,
        "batch_id,letter_id,recipient_name,recipient_address1,recipient_city,recipient_state,recipient_zip,service_class,return_address_id,document_filename,sha256"
    );
    let data_line = csv.lines().nth(1).unwrap();
    assert!(data_line.contains(&batch.letter_ids[0].to_string()));
    assert!(data_line.ends_with("deadbeef"));

    let hash = BatchLetterPipeline::manifest_sha256(&csv);
    assert_eq!(hash.len(), 32);
}

fn unused_pipeline() -> dispute_core::batch_pipeline::BatchLetterPipeline {
    let clock = clock_at(2026, 1, 9, 9, 0);
    let gateway = Gateway::new(Store::open_temporary().unwrap(), EventBus::default(), clock);
    dispute_core::batch_pipeline::BatchLetterPipeline::new(gateway, 1100)
}
