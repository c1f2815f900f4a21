//! §6 inbound HTTP command API. Staff/portal consoles are out of scope;
//! this is the small surface they (and the payment provider) drive.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use hmac::{Hmac, Mac};
use std::sync::Arc;

use crate::domain::ids::{ClientId, LetterBatchId};
use crate::error::CoreError;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/commands/dispute/:client_id/advance-round", post(advance_round))
        .route("/commands/letters/batch/:batch_id/approve", post(approve_batch))
        .route("/commands/credit-report/import", post(import_credit_report))
        .route("/webhooks/payments", post(payment_webhook))
        .route("/status/client/:client_id", get(client_status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AdvanceRoundBody {
    round: u8,
    #[serde(rename = "approvedBatchId")]
    approved_batch_id: Option<LetterBatchId>,
}

async fn advance_round(
    State(state): State<ApiState>,
    Path(client_id): Path<ClientId>,
    Json(body): Json<AdvanceRoundBody>,
) -> impl IntoResponse {
    match state.orchestrator.command_advance_round(client_id, body.round, body.approved_batch_id) {
        Ok(new_state) => (StatusCode::OK, Json(json!({"state": format!("{:?}", new_state)}))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn approve_batch(State(state): State<ApiState>, Path(batch_id): Path<LetterBatchId>) -> impl IntoResponse {
    match state.orchestrator.command_approve_batch(batch_id) {
        Ok(task_id) => (StatusCode::ACCEPTED, Json(json!({"taskId": task_id}))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct ImportReportBody {
    #[serde(rename = "clientId")]
    client_id: ClientId,
    provider: String,
    #[serde(rename = "credentialsRef")]
    credentials_ref: String,
}

async fn import_credit_report(State(state): State<ApiState>, Json(body): Json<ImportReportBody>) -> impl IntoResponse {
    match state.orchestrator.command_import_credit_report(body.client_id, &body.provider, &body.credentials_ref) {
        Ok(task_id) => (StatusCode::ACCEPTED, Json(json!({"taskId": task_id}))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct PaymentWebhookBody {
    #[serde(rename = "providerEventId")]
    provider_event_id: String,
    #[serde(rename = "clientId")]
    client_id: ClientId,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(rename = "amountMinor")]
    amount_minor: i64,
}

async fn payment_webhook(
    State(state): State<ApiState>,
    headers: axum::http::HeaderMap,
    body_bytes: axum::body::Bytes,
) -> impl IntoResponse {
    let signature = headers.get("X-Webhook-Signature").and_then(|v| v.to_str().ok()).unwrap_or_default();
    if !verify_signature(state.orchestrator.webhook_secret(), &body_bytes, signature) {
        return (StatusCode::BAD_REQUEST, Json(json!({"code": "bad_signature", "message": "invalid webhook signature"})))
            .into_response();
    }

    let body: PaymentWebhookBody = match serde_json::from_slice(&body_bytes) {
        Ok(b) => b,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({"code": "validation", "message": e.to_string()}))).into_response()
        }
    };

    match state.orchestrator.command_payment_webhook(&body.provider_event_id, body.client_id, &body.event_type, body.amount_minor) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(err),
    }
}

async fn client_status(State(state): State<ApiState>, Path(client_id): Path<ClientId>) -> impl IntoResponse {
    match state.orchestrator.query_client_status(client_id) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: CoreError) -> axum::response::Response {
    let (status, code) = match &err {
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        CoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        CoreError::PolicyBlocked(_) => (StatusCode::UNPROCESSABLE_ENTITY, "policy_blocked"),
        CoreError::Transient(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        CoreError::Cancelled => (StatusCode::CONFLICT, "cancelled"),
        CoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (status, Json(json!({"code": code, "message": err.to_string(), "details": null}))).into_response()
}

type HmacSha256 = Hmac<Sha256>;

fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Serialize)]
pub struct ClientStatusResponse {
    pub client_id: ClientId,
    pub state: String,
    pub current_round: u8,
}
