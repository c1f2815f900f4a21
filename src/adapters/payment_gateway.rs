//! PaymentGateway adapter: create/capture/refund/hold. Webhooks are
//! ingested as `payment.*` events elsewhere (api::webhooks); signature
//! verification and event-id dedup live there, not in this adapter, since
//! the adapter only models outbound calls (§4.9).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::AdapterResult;
use crate::error::AdapterError;

pub const PAYMENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct CaptureRequest {
    pub idempotency_key: String,
    pub amount_minor: i64,
    pub card_on_file_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureResponse {
    pub provider_ref: String,
    pub captured_minor: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn capture(&self, request: CaptureRequest) -> AdapterResult<CaptureResponse>;
    async fn refund(&self, provider_ref: &str, amount_minor: i64) -> AdapterResult<()>;
    async fn release_hold(&self, provider_ref: &str) -> AdapterResult<()>;
}

pub struct HttpPaymentGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPaymentGateway {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder().timeout(PAYMENT_TIMEOUT).build().expect("reqwest client");
        Self { client, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn capture(&self, request: CaptureRequest) -> AdapterResult<CaptureResponse> {
        let resp = self
            .client
            .post(format!("{}/captures", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(format!("capture request failed: {e}")))?;

        match resp.status() {
            s if s.is_success() => resp
                .json()
                .await
                .map_err(|e| AdapterError::Permanent(format!("malformed capture response: {e}"))),
            reqwest::StatusCode::PAYMENT_REQUIRED => Err(AdapterError::Permanent("card declined".into())),
            s => Err(AdapterError::Transient(format!("payment gateway returned {s}"))),
        }
    }

    async fn refund(&self, provider_ref: &str, amount_minor: i64) -> AdapterResult<()> {
        let resp = self
            .client
            .post(format!("{}/captures/{provider_ref}/refund", self.endpoint))
            .json(&serde_json::json!({"amount_minor": amount_minor}))
            .send()
            .await
            .map_err(|e| AdapterError::Transient(format!("refund request failed: {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(AdapterError::Transient(format!("refund returned {}", resp.status())))
        }
    }

    async fn release_hold(&self, provider_ref: &str) -> AdapterResult<()> {
        let resp = self
            .client
            .post(format!("{}/holds/{provider_ref}/release", self.endpoint))
            .send()
            .await
            .map_err(|e| AdapterError::Transient(format!("release request failed: {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(AdapterError::Transient(format!("release returned {}", resp.status())))
        }
    }
}
