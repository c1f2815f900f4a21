//! End-to-end scenarios from §8, driven against a `TestClock` so every
//! timestamp in the assertions is exact rather than wall-clock-relative.

use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::America::New_York;
use std::sync::Arc;

use dispute_core::clock::{Clock, TestClock};
use dispute_core::config::Config;
use dispute_core::domain::ids::{ClientId, LetterId, TenantId};
use dispute_core::domain::{Bureau, Letter, LetterKind, LetterStatus, Recipient};
use dispute_core::orchestrator::Orchestrator;
use dispute_core::persistence::Store;
use dispute_core::state_machine::RoundState;

fn test_clock_at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Arc<TestClock> {
    let signed_at = New_York.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().with_timezone(&Utc);
    TestClock::new(signed_at, New_York, vec![NaiveDate::from_ymd_opt(2026, 1, 19).unwrap()])
}

fn letter_key(id: LetterId) -> String {
    format!("letter:{id}")
}

#[test]
fn scenario_1_croa_hold_math() {
    let clock = test_clock_at(2026, 1, 5, 14, 30);
    let store = Store::open_temporary().unwrap();
    let orchestrator = Orchestrator::new(store, clock.clone(), Config::from_env());

    let tenant_id = TenantId::new();
    let client = orchestrator.create_client(tenant_id).unwrap();
    orchestrator.state_machine.on_analysis_delivered(client.id).unwrap();

    let signed_at = clock.now();
    orchestrator.state_machine.on_croa_signed(client.id, signed_at).unwrap();
    let deadline = orchestrator.deadlines.on_croa_signed(tenant_id, client.id.0, signed_at).unwrap().unwrap();

    let due_local = deadline.due_at.with_timezone(&New_York);
    assert_eq!(due_local.date_naive(), NaiveDate::from_ymd_opt(2026, 1, 8).unwrap());
    assert_eq!(due_local.format("%H:%M:%S").to_string(), "23:59:59");

    // No round-1 letter may reach `queued` before the CROA hold clears.
    let state = orchestrator.state_machine.get(client.id).unwrap();
    assert_eq!(state.state, RoundState::CroaHold);
}

#[test]
fn scenario_2_round1_happy_path_creates_response_deadlines() {
    let clock = test_clock_at(2026, 1, 9, 9, 0);
    let store = Store::open_temporary().unwrap();
    let orchestrator = Orchestrator::new(store, clock.clone(), Config::from_env());

    let tenant_id = TenantId::new();
    let client = orchestrator.create_client(tenant_id).unwrap();
    orchestrator.state_machine.on_analysis_delivered(client.id).unwrap();
    orchestrator.state_machine.on_croa_signed(client.id, clock.now()).unwrap();
    orchestrator.state_machine.on_croa_hold_cleared(client.id, true).unwrap();
    orchestrator.state_machine.on_letters_generated(client.id, 1).unwrap();

    let mut letter_ids = Vec::new();
    for bureau in [Bureau::Equifax, Bureau::Experian, Bureau::TransUnion] {
        let letter = Letter {
            id: LetterId::new(),
            tenant_id,
            client_id: client.id,
            round: 1,
            kind: LetterKind::Round1,
            recipient: Recipient::Bureau(bureau),
            status: LetterStatus::Approved,
            tracking_number: None,
            batch_id: None,
            content_sha256: [0u8; 32],
            delivered_at: None,
        };
        orchestrator.store.put(&letter_key(letter.id), &letter).unwrap();
        letter_ids.push(letter.id);
    }

    let batch = orchestrator.batch_pipeline.draft_batch(tenant_id, letter_ids.clone()).unwrap();
    orchestrator.batch_pipeline.mark_uploaded(batch.id, [1u8; 32], vec!["batch1.csv".into()]).unwrap();
    orchestrator.state_machine.on_batch_uploaded(client.id, 1).unwrap();

    let ack_rows: Vec<_> = letter_ids
        .iter()
        .map(|id| dispute_core::batch_pipeline::AckRow { letter_id: *id, tracking_number: format!("TRK-{id}"), status: "ACCEPTED".into() })
        .collect();
    orchestrator.batch_pipeline.ingest_ack(batch.id, &ack_rows).unwrap();

    clock.set(New_York.with_ymd_and_hms(2026, 1, 12, 15, 0, 0).unwrap().with_timezone(&Utc));
    let delivered_ts = clock.now();
    let mut response_deadline_count = 0;
    let mut overdue_deadline_count = 0;
    for id in &letter_ids {
        orchestrator.batch_pipeline.apply_tracking_event(&format!("TRK-{id}"), delivered_ts, "DELIVERED").unwrap();
        let created = orchestrator.deadlines.on_letter_delivered(tenant_id, id.0, delivered_ts).unwrap();
        for d in created {
            match d.kind {
                dispute_core::domain::DeadlineKind::RoundResponse => {
                    response_deadline_count += 1;
                    let due_local = d.due_at.with_timezone(&New_York);
                    assert_eq!(due_local.date_naive(), NaiveDate::from_ymd_opt(2026, 2, 11).unwrap());
                }
                dispute_core::domain::DeadlineKind::OverdueEscalation => overdue_deadline_count += 1,
                _ => {}
            }
        }
    }

    assert_eq!(response_deadline_count, 3);
    assert_eq!(overdue_deadline_count, 3);

    // None of the overdue-escalation deadlines have fired yet.
    let fired = orchestrator.deadlines.fire_due().unwrap();
    assert!(fired.is_empty());
}

#[test]
fn scenario_5_duplicate_webhook_captures_once() {
    let clock = test_clock_at(2026, 1, 9, 9, 0);
    let store = Store::open_temporary().unwrap();
    let orchestrator = Orchestrator::new(store, clock.clone(), Config::from_env());

    let tenant_id = TenantId::new();
    let client = orchestrator.create_client(tenant_id).unwrap();
    orchestrator.state_machine.on_analysis_delivered(client.id).unwrap();
    orchestrator.state_machine.on_croa_signed(client.id, clock.now()).unwrap();

    orchestrator.command_payment_webhook("evt_123", client.id, "payment.captured", 29_800).unwrap();
    orchestrator.command_payment_webhook("evt_123", client.id, "payment.captured", 29_800).unwrap();

    let payments: Vec<dispute_core::domain::Payment> = orchestrator.store.scan_prefix("payment:").unwrap();
    assert_eq!(payments.len(), 1);

    let state = orchestrator.state_machine.get(client.id).unwrap();
    assert_eq!(state.state, RoundState::RoundLettersGenerated(1));
}

#[test]
fn scenario_6_batch_partial_failure_reverts_letters_and_never_reuses_batch_id() {
    let clock = test_clock_at(2026, 1, 9, 9, 0);
    let store = Store::open_temporary().unwrap();
    let orchestrator = Orchestrator::new(store, clock.clone(), Config::from_env());
    let tenant_id = TenantId::new();

    let mut letter_ids = Vec::new();
    for _ in 0..2 {
        let letter = Letter {
            id: LetterId::new(),
            tenant_id,
            client_id: ClientId::new(),
            round: 1,
            kind: LetterKind::Round1,
            recipient: Recipient::Bureau(Bureau::Equifax),
            status: LetterStatus::Approved,
            tracking_number: None,
            batch_id: None,
            content_sha256: [0u8; 32],
            delivered_at: None,
        };
        orchestrator.store.put(&letter_key(letter.id), &letter).unwrap();
        letter_ids.push(letter.id);
    }

    let batch1 = orchestrator.batch_pipeline.draft_batch(tenant_id, letter_ids.clone()).unwrap();
    // Only one of the two letters acknowledges -> partial upload mismatch.
    let partial_ack = vec![dispute_core::batch_pipeline::AckRow {
        letter_id: letter_ids[0],
        tracking_number: "TRK-1".into(),
        status: "ACCEPTED".into(),
    }];
    let status = orchestrator.batch_pipeline.ingest_ack(batch1.id, &partial_ack).unwrap();
    assert_eq!(status, dispute_core::domain::BatchStatus::Failed);

    for id in &letter_ids {
        let letter: Letter = orchestrator.store.get(&letter_key(*id)).unwrap().unwrap();
        assert_eq!(letter.status, LetterStatus::Approved);
        assert!(letter.batch_id.is_none());
    }

    let batch2 = orchestrator.batch_pipeline.draft_batch(tenant_id, letter_ids).unwrap();
    assert_ne!(batch1.id, batch2.id);
}

#[test]
fn scenario_3_overdue_escalation() {
    let clock = test_clock_at(2026, 1, 9, 9, 0);
    let store = Store::open_temporary().unwrap();
    let orchestrator = Orchestrator::new(store, clock.clone(), Config::from_env());
    let tenant_id = TenantId::new();

    let client = orchestrator.create_client(tenant_id).unwrap();
    orchestrator.state_machine.on_analysis_delivered(client.id).unwrap();
    orchestrator.state_machine.on_croa_signed(client.id, clock.now()).unwrap();
    orchestrator.state_machine.on_croa_hold_cleared(client.id, true).unwrap();
    orchestrator.state_machine.on_letters_generated(client.id, 1).unwrap();

    let letter = Letter {
        id: LetterId::new(),
        tenant_id,
        client_id: client.id,
        round: 1,
        kind: LetterKind::Round1,
        recipient: Recipient::Bureau(Bureau::Equifax),
        status: LetterStatus::Approved,
        tracking_number: None,
        batch_id: None,
        content_sha256: [0u8; 32],
        delivered_at: None,
    };
    orchestrator.store.put(&letter_key(letter.id), &letter).unwrap();

    let batch = orchestrator.batch_pipeline.draft_batch(tenant_id, vec![letter.id]).unwrap();
    orchestrator.batch_pipeline.mark_uploaded(batch.id, [1u8; 32], vec!["batch1.csv".into()]).unwrap();
    orchestrator.state_machine.on_batch_uploaded(client.id, 1).unwrap();
    let ack_rows = vec![dispute_core::batch_pipeline::AckRow {
        letter_id: letter.id,
        tracking_number: "TRK-overdue".into(),
        status: "ACCEPTED".into(),
    }];
    orchestrator.batch_pipeline.ingest_ack(batch.id, &ack_rows).unwrap();

    clock.set(New_York.with_ymd_and_hms(2026, 1, 12, 15, 0, 0).unwrap().with_timezone(&Utc));
    let delivered_ts = clock.now();
    orchestrator.batch_pipeline.apply_tracking_event("TRK-overdue", delivered_ts, "DELIVERED").unwrap();
    let created = orchestrator.deadlines.on_letter_delivered(tenant_id, letter.id.0, delivered_ts).unwrap();
    let overdue = created
        .iter()
        .find(|d| d.kind == dispute_core::domain::DeadlineKind::OverdueEscalation)
        .expect("overdue_escalation deadline opened on delivery");

    // No response gathered before the escalation deadline lapses.
    clock.set(overdue.due_at + chrono::Duration::minutes(1));
    let fired = orchestrator.deadlines.fire_due().unwrap();
    assert!(fired.iter().any(|e| e.event_type == "deadline.fired"));
    for event in &fired {
        orchestrator.route_event(event).unwrap();
    }

    let state = orchestrator.state_machine.get(client.id).unwrap();
    assert_eq!(state.state, RoundState::EscalatedRegulatory);

    let tasks: Vec<dispute_core::task_queue::Task> = orchestrator.store.scan_prefix("task:").unwrap();
    assert!(tasks
        .iter()
        .any(|t| t.task_type == dispute_core::task_queue::TaskType::GenerateLetterAi
            && t.payload.get("kind").and_then(|v| v.as_str()) == Some("regulatory_complaint")));
}

#[test]
fn scenario_4_reinsertion_detection() {
    let clock = test_clock_at(2026, 3, 10, 9, 0);
    let store = Store::open_temporary().unwrap();
    let orchestrator = Orchestrator::new(store, clock.clone(), Config::from_env());
    let tenant_id = TenantId::new();
    let dispute_item_id = uuid::Uuid::new_v4();

    let detected_at = clock.now();
    let deadline = orchestrator
        .deadlines
        .on_reinsertion_detected(tenant_id, dispute_item_id, detected_at)
        .unwrap()
        .expect("first detection opens a reinsertion_notice deadline");
    assert_eq!(deadline.kind, dispute_core::domain::DeadlineKind::ReinsertionNotice);

    let due_local = deadline.due_at.with_timezone(&New_York);
    let expected_due = clock.add_business_days(detected_at, 5).with_timezone(&New_York);
    assert_eq!(due_local.date_naive(), expected_due.date_naive());

    let committed = orchestrator.gateway.events_for(dispute_item_id).unwrap();
    let reinsertion_event = committed.into_iter().find(|e| e.event_type == "reinsertion.detected").expect("reinsertion.detected emitted");
    orchestrator.route_event(&reinsertion_event).unwrap();

    let tasks: Vec<dispute_core::task_queue::Task> = orchestrator.store.scan_prefix("task:").unwrap();
    assert!(tasks
        .iter()
        .any(|t| t.task_type == dispute_core::task_queue::TaskType::GenerateLetterAi
            && t.payload.get("kind").and_then(|v| v.as_str()) == Some("605b_letter")));

    // A second detection while the notice deadline is still unresolved is a no-op.
    let second = orchestrator.deadlines.on_reinsertion_detected(tenant_id, dispute_item_id, clock.now()).unwrap();
    assert!(second.is_none());
}

#[test]
fn business_day_math_is_deterministic_and_monotone() {
    let clock = test_clock_at(2026, 1, 5, 9, 0);
    let base = clock.now();
    let mut prev = base;
    for n in 1..15 {
        let next = clock.add_business_days(base, n);
        assert!(next > prev);
        prev = next;
    }
}
