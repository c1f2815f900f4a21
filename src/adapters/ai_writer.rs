//! AIWriter adapter: generates a letter for `(client snapshot, round,
//! recipient, kind)`, returning text plus token cost. Enforces a
//! per-conversation token budget and surfaces policy blocks distinctly
//! from transient failures (§4.9).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::AdapterResult;
use crate::domain::{Bureau, LetterKind};
use crate::error::AdapterError;

pub const AI_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiLetterRequest {
    pub client_snapshot: serde_json::Value,
    pub round: u8,
    pub recipient_bureau: Option<Bureau>,
    pub kind: LetterKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiLetterResponse {
    pub text: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait AiWriter: Send + Sync {
    async fn generate_letter(&self, request: AiLetterRequest) -> AdapterResult<AiLetterResponse>;
}

pub struct HttpAiWriter {
    client: reqwest::Client,
    endpoint: String,
    budget_tokens: u64,
    tokens_spent: AtomicU64,
}

impl HttpAiWriter {
    pub fn new(endpoint: impl Into<String>, budget_tokens: u64) -> Self {
        let client = reqwest::Client::builder().timeout(AI_TIMEOUT).build().expect("reqwest client");
        Self { client, endpoint: endpoint.into(), budget_tokens, tokens_spent: AtomicU64::new(0) }
    }
}

#[async_trait]
impl AiWriter for HttpAiWriter {
    async fn generate_letter(&self, request: AiLetterRequest) -> AdapterResult<AiLetterResponse> {
        if self.tokens_spent.load(Ordering::Relaxed) >= self.budget_tokens {
            return Err(AdapterError::PolicyBlocked("per-conversation token budget exhausted".into()));
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(format!("AI request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(AdapterError::PolicyBlocked("AI content violates policy".into()));
        }
        if !resp.status().is_success() {
            return Err(AdapterError::Transient(format!("AI provider returned {}", resp.status())));
        }

        let body: AiLetterResponse =
            resp.json().await.map_err(|e| AdapterError::Permanent(format!("malformed AI response: {e}")))?;
        self.tokens_spent.fetch_add(body.tokens_used, Ordering::Relaxed);
        Ok(body)
    }
}
