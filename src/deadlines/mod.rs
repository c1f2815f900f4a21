//! §4.7 Deadline & SLA Tracker: the exclusive writer of `Deadline` rows.
//! Creates deadlines in reaction to domain events, and the Scheduler polls
//! for due-and-unresolved rows to enqueue `fire_deadline`.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::ids::{DeadlineId, TenantId};
use crate::domain::{Deadline, DeadlineKind};
use crate::error::CoreResult;
use crate::events::{AggregateType, DomainEvent};
use crate::persistence::{Gateway, Store};

pub struct DeadlineTracker {
    gateway: Gateway,
    clock: Arc<dyn Clock>,
}

impl DeadlineTracker {
    pub fn new(gateway: Gateway, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }

    fn store(&self) -> &Store {
        self.gateway.store()
    }

    fn storage_key(id: DeadlineId) -> String {
        format!("deadline:{id}")
    }

    /// Invariant (3) data model §3: at most one unresolved deadline of a
    /// given kind per parent.
    fn unresolved_exists(&self, parent_id: Uuid, kind: DeadlineKind) -> CoreResult<bool> {
        let all: Vec<Deadline> = self.store().scan_prefix("deadline:")?;
        Ok(all.iter().any(|d| d.parent_id == parent_id && d.kind == kind && d.is_unresolved()))
    }

    fn create(&self, tenant_id: TenantId, parent_id: Uuid, kind: DeadlineKind, due_at: DateTime<Utc>) -> CoreResult<Option<Deadline>> {
        if self.unresolved_exists(parent_id, kind)? {
            return Ok(None);
        }
        let deadline = Deadline {
            id: DeadlineId::new(),
            tenant_id,
            kind,
            parent_id,
            due_at,
            fired_at: None,
            resolved_at: None,
        };
        self.store().put(&Self::storage_key(deadline.id), &deadline)?;
        Ok(Some(deadline))
    }

    /// `croa.signed` -> `croa_hold` at +3 business days, end of business day.
    pub fn on_croa_signed(&self, tenant_id: TenantId, client_id: Uuid, signed_at: DateTime<Utc>) -> CoreResult<Option<Deadline>> {
        let due = self.clock.add_business_days(signed_at, 3);
        let due_eod = end_of_business_day(due, self.clock.business_tz());
        self.create(tenant_id, client_id, DeadlineKind::CroaHold, due_eod)
    }

    /// `letter.delivered` -> `round_response` at +30 calendar days, and
    /// `overdue_escalation` at +35 business days.
    pub fn on_letter_delivered(&self, tenant_id: TenantId, letter_id: Uuid, delivered_at: DateTime<Utc>) -> CoreResult<Vec<Deadline>> {
        let mut created = Vec::new();
        if let Some(d) = self.create(tenant_id, letter_id, DeadlineKind::RoundResponse, delivered_at + ChronoDuration::days(30))? {
            created.push(d);
        }
        let overdue_at = self.clock.add_business_days(delivered_at, 35);
        if let Some(d) = self.create(tenant_id, letter_id, DeadlineKind::OverdueEscalation, overdue_at)? {
            created.push(d);
        }
        Ok(created)
    }

    /// `response.received` with reinsertion -> `reinsertion_notice` at +5
    /// business days, and emits `reinsertion.detected` so the §611(a)(5)(B)
    /// letter trigger has an event to match against.
    pub fn on_reinsertion_detected(&self, tenant_id: TenantId, dispute_item_id: Uuid, detected_at: DateTime<Utc>) -> CoreResult<Option<Deadline>> {
        if self.unresolved_exists(dispute_item_id, DeadlineKind::ReinsertionNotice)? {
            return Ok(None);
        }
        let due = self.clock.add_business_days(detected_at, 5);
        let deadline = Deadline {
            id: DeadlineId::new(),
            tenant_id,
            kind: DeadlineKind::ReinsertionNotice,
            parent_id: dispute_item_id,
            due_at: due,
            fired_at: None,
            resolved_at: None,
        };
        let key = Self::storage_key(deadline.id);
        let staged = deadline.clone();
        self.gateway.run(tenant_id, dispute_item_id, move |tx| {
            tx.stage_write(&key, &staged)?;
            tx.stage_event(AggregateType::DisputeItem, "reinsertion.detected", &serde_json::json!({"detected_at": detected_at}))
        })?;
        Ok(Some(deadline))
    }

    pub fn on_report_pulled(&self, tenant_id: TenantId, client_id: Uuid, pulled_at: DateTime<Utc>) -> CoreResult<Option<Deadline>> {
        self.create(tenant_id, client_id, DeadlineKind::Obsolescence, pulled_at + ChronoDuration::days(7 * 365))
    }

    /// Fires all unresolved deadlines whose `due_at <= now`; each fire is
    /// exactly-once and marks the row resolved. Called from the
    /// `fire_deadline` task handler, so retried task attempts are
    /// idempotent (the row is already resolved on re-delivery).
    pub fn fire_due(&self) -> CoreResult<Vec<DomainEvent>> {
        let now = self.clock.now();
        let due: Vec<Deadline> = self
            .store()
            .scan_prefix::<Deadline>("deadline:")?
            .into_iter()
            .filter(|d| d.is_unresolved() && d.due_at <= now)
            .collect();

        let mut events = Vec::new();
        for mut deadline in due {
            deadline.fired_at = Some(now);
            deadline.resolved_at = Some(now);
            let key = Self::storage_key(deadline.id);
            let staged = deadline.clone();
            let payload = serde_json::json!({
                "kind": deadline.kind,
                "parent_id": deadline.parent_id,
            });
            let committed = self.gateway.run(deadline.tenant_id, deadline.id.0, move |tx| {
                tx.stage_write(&key, &staged)?;
                tx.stage_event(AggregateType::Deadline, "deadline.fired", &payload)
            })?;
            events.extend(committed);
        }
        Ok(events)
    }
}

fn end_of_business_day(at: DateTime<Utc>, tz: chrono_tz::Tz) -> DateTime<Utc> {
    let local = at.with_timezone(&tz);
    let eod = local.date_naive().and_hms_opt(23, 59, 59).expect("valid time");
    tz.from_local_datetime(&eod).single().expect("unambiguous local time").with_timezone(&Utc)
}
