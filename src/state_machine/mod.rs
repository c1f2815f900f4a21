//! §4.6 Dispute Round State Machine: the only writer of `DisputeItem`,
//! round-scoped `Letter.status`, and round-level `Deadline`s. One instance
//! of state per client; transitions are idempotent and re-entrant, and a
//! staff manual transition always wins over a conflicting automatic one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{ClientId, TenantId};
use crate::error::{CoreError, CoreResult};
use crate::events::AggregateType;
use crate::persistence::{Gateway, Store};

/// Per-client dispute round state. Round-numbered stages carry their round
/// explicitly rather than relying on a side `current_round` counter, so a
/// stored state is self-describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Intake,
    AnalysisReady,
    AnalysisDelivered,
    CroaHold,
    RoundLettersGenerated(u8),
    RoundPendingApproval(u8),
    RoundInFlight(u8),
    RoundResponsesGathered(u8),
    PaymentBlocked(u8),
    EscalatedRegulatory,
    EscalatedPrearb,
    Litigation,
    Resolved,
    Closed,
}

impl RoundState {
    pub fn round(&self) -> Option<u8> {
        match self {
            RoundState::RoundLettersGenerated(r)
            | RoundState::RoundPendingApproval(r)
            | RoundState::RoundInFlight(r)
            | RoundState::RoundResponsesGathered(r)
            | RoundState::PaymentBlocked(r) => Some(*r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDisputeState {
    pub client_id: ClientId,
    pub tenant_id: TenantId,
    pub state: RoundState,
    pub payment_failure_attempts: u32,
    /// Set once a staff manual transition has run; suppresses automatic
    /// retries until staff clears it (§4.6 tie-break).
    pub manual_override: bool,
}

impl ClientDisputeState {
    fn storage_key(client_id: ClientId) -> String {
        format!("dispute_state:{client_id}")
    }

    pub fn new(tenant_id: TenantId, client_id: ClientId) -> Self {
        Self { client_id, tenant_id, state: RoundState::Intake, payment_failure_attempts: 0, manual_override: false }
    }
}

const MAX_ROUND: u8 = 4;

pub struct DisputeStateMachine {
    gateway: Gateway,
}

impl DisputeStateMachine {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    fn store(&self) -> &Store {
        self.gateway.store()
    }

    pub fn get(&self, client_id: ClientId) -> CoreResult<ClientDisputeState> {
        self.load_or_init_current(client_id)
    }

    pub fn load_or_init(&self, tenant_id: TenantId, client_id: ClientId) -> CoreResult<ClientDisputeState> {
        if let Some(state) = self.store().get(&ClientDisputeState::storage_key(client_id))? {
            Ok(state)
        } else {
            let fresh = ClientDisputeState::new(tenant_id, client_id);
            self.store().put(&ClientDisputeState::storage_key(client_id), &fresh)?;
            Ok(fresh)
        }
    }

    /// Stages the new state plus one domain event and commits both through
    /// the Gateway in a single aggregate transaction, so `sequence` stays
    /// dense and gap-free for this client (§3).
    fn commit(&self, state: &ClientDisputeState, event_type: &str, payload: serde_json::Value) -> CoreResult<()> {
        let key = ClientDisputeState::storage_key(state.client_id);
        let state = state.clone();
        let event_type = event_type.to_string();
        self.gateway.run(state.tenant_id, state.client_id.0, move |tx| {
            tx.stage_write(&key, &state)?;
            tx.stage_event(AggregateType::Client, event_type.clone(), &payload)
        })?;
        Ok(())
    }

    fn emit_only(&self, state: &ClientDisputeState, event_type: &str, payload: serde_json::Value) -> CoreResult<()> {
        let event_type = event_type.to_string();
        self.gateway.run(state.tenant_id, state.client_id.0, move |tx| {
            tx.stage_event(AggregateType::Client, event_type.clone(), &payload)
        })?;
        Ok(())
    }

    /// Refuses an out-of-order automatic transition rather than corrupting
    /// state (§5): returns Ok(false) and emits `transition_ignored`.
    fn guard_automatic(&self, state: &ClientDisputeState) -> CoreResult<bool> {
        if state.manual_override {
            self.emit_only(state, "transition_ignored", serde_json::json!({"reason": "manual_override_active"}))?;
            return Ok(false);
        }
        Ok(true)
    }

    /// `analysis_delivered -> croa_hold` on first CROA signature.
    pub fn on_croa_signed(&self, client_id: ClientId, signed_at: DateTime<Utc>) -> CoreResult<ClientDisputeState> {
        let mut dispute = self.load_or_init_current(client_id)?;
        if !self.guard_automatic(&dispute)? {
            return Ok(dispute);
        }
        if dispute.state != RoundState::AnalysisDelivered {
            return Ok(dispute); // idempotent / re-entrant: already past this point
        }
        dispute.state = RoundState::CroaHold;
        self.commit(&dispute, "croa.signed", serde_json::json!({"signed_at": signed_at}))?;
        Ok(dispute)
    }

    pub fn on_analysis_delivered(&self, client_id: ClientId) -> CoreResult<ClientDisputeState> {
        let mut dispute = self.load_or_init_current(client_id)?;
        if dispute.state == RoundState::AnalysisReady || dispute.state == RoundState::Intake {
            dispute.state = RoundState::AnalysisDelivered;
            self.commit(&dispute, "analysis.delivered", serde_json::json!({}))?;
        }
        Ok(dispute)
    }

    /// `croa_hold -> round1_letters_generated` once the CROA hold deadline
    /// has fired AND round-1 payment captured. If payment capture fails
    /// during this transition, it is rejected and a reminder is scheduled
    /// (§4.6 edge-case policy); after 3 failed attempts the client enters
    /// `payment_blocked`.
    pub fn on_croa_hold_cleared(&self, client_id: ClientId, payment_captured: bool) -> CoreResult<ClientDisputeState> {
        let mut dispute = self.load_or_init_current(client_id)?;
        if !self.guard_automatic(&dispute)? {
            return Ok(dispute);
        }
        if dispute.state != RoundState::CroaHold {
            return Ok(dispute);
        }

        if !payment_captured {
            dispute.payment_failure_attempts += 1;
            if dispute.payment_failure_attempts >= 3 {
                dispute.state = RoundState::PaymentBlocked(1);
                self.commit(&dispute, "payment.blocked", serde_json::json!({}))?;
            } else {
                self.commit(&dispute, "payment.failed", serde_json::json!({"attempt": dispute.payment_failure_attempts}))?;
            }
            return Err(CoreError::Conflict("round1 payment capture failed".into()));
        }

        dispute.state = RoundState::RoundLettersGenerated(1);
        dispute.payment_failure_attempts = 0;
        self.commit(&dispute, "payment.captured", serde_json::json!({"round": 1}))?;
        Ok(dispute)
    }

    /// `roundN_letters_generated -> roundN_pending_approval` once all
    /// bureau/furnisher AI-letter tasks for the round have succeeded.
    pub fn on_letters_generated(&self, client_id: ClientId, round: u8) -> CoreResult<ClientDisputeState> {
        let mut dispute = self.load_or_init_current(client_id)?;
        if dispute.state != RoundState::RoundLettersGenerated(round) {
            return Ok(dispute);
        }
        dispute.state = RoundState::RoundPendingApproval(round);
        self.commit(&dispute, "letters.generated", serde_json::json!({"round": round}))?;
        Ok(dispute)
    }

    /// `roundN_pending_approval -> roundN_in_flight` when staff approves a
    /// batch and it reaches `uploaded`.
    pub fn on_batch_uploaded(&self, client_id: ClientId, round: u8) -> CoreResult<ClientDisputeState> {
        let mut dispute = self.load_or_init_current(client_id)?;
        if dispute.state != RoundState::RoundPendingApproval(round) {
            return Ok(dispute);
        }
        dispute.state = RoundState::RoundInFlight(round);
        self.commit(&dispute, "batch.uploaded", serde_json::json!({"round": round}))?;
        Ok(dispute)
    }

    /// `roundN_in_flight -> roundN_responses_gathered` either when all
    /// letters are delivered with responses recorded, or after the 35
    /// business-day overdue-escalation window lapses (auto-escalation).
    pub fn on_responses_gathered(&self, client_id: ClientId, round: u8, via_overdue_escalation: bool) -> CoreResult<ClientDisputeState> {
        let mut dispute = self.load_or_init_current(client_id)?;
        if !self.guard_automatic(&dispute)? && !via_overdue_escalation {
            return Ok(dispute);
        }
        if dispute.state != RoundState::RoundInFlight(round) {
            return Ok(dispute);
        }
        dispute.state = RoundState::RoundResponsesGathered(round);

        if via_overdue_escalation {
            dispute.state = RoundState::EscalatedRegulatory;
            let key = ClientDisputeState::storage_key(dispute.client_id);
            let staged = dispute.clone();
            self.gateway.run(dispute.tenant_id, dispute.client_id.0, move |tx| {
                tx.stage_write(&key, &staged)?;
                tx.stage_event(AggregateType::Client, "responses.gathered", &serde_json::json!({"round": round, "overdue": true}))?;
                tx.stage_event(AggregateType::Client, "client.escalated_regulatory", &serde_json::json!({"round": round}))
            })?;
        } else {
            self.commit(&dispute, "responses.gathered", serde_json::json!({"round": round, "overdue": false}))?;
        }
        Ok(dispute)
    }

    pub fn on_round_advance(&self, client_id: ClientId, from_round: u8) -> CoreResult<ClientDisputeState> {
        let mut dispute = self.load_or_init_current(client_id)?;
        if dispute.state != RoundState::RoundResponsesGathered(from_round) {
            return Ok(dispute);
        }
        dispute.state = if from_round >= MAX_ROUND {
            RoundState::Resolved
        } else {
            RoundState::RoundLettersGenerated(from_round + 1)
        };
        self.commit(&dispute, "round.advanced", serde_json::json!({"from_round": from_round}))?;
        Ok(dispute)
    }

    /// A staff manual transition always wins over a conflicting automatic
    /// one; emits `override_logged` and suppresses further automatic
    /// retries until staff clears it.
    pub fn apply_manual_override(&self, client_id: ClientId, new_state: RoundState) -> CoreResult<ClientDisputeState> {
        let mut dispute = self.load_or_init_current(client_id)?;
        dispute.state = new_state;
        dispute.manual_override = true;
        self.commit(&dispute, "override_logged", serde_json::json!({"new_state": format!("{:?}", new_state)}))?;
        Ok(dispute)
    }

    pub fn clear_manual_override(&self, client_id: ClientId) -> CoreResult<ClientDisputeState> {
        let mut dispute = self.load_or_init_current(client_id)?;
        dispute.manual_override = false;
        self.store().put(&ClientDisputeState::storage_key(client_id), &dispute)?;
        Ok(dispute)
    }

    fn load_or_init_current(&self, client_id: ClientId) -> CoreResult<ClientDisputeState> {
        self.store()
            .get(&ClientDisputeState::storage_key(client_id))?
            .ok_or_else(|| CoreError::NotFound(format!("no dispute state for client {client_id}")))
    }
}
