//! CreditScraper adapter: per-provider headless-browser flow against
//! encrypted credentials, extracting a structured report. One credential
//! pair per `(client, provider)`; concurrent scrapes for the same pair
//! coalesce to one task via the Task Queue's idempotency key, not here.

use async_trait::async_trait;
use std::time::Duration;

use super::AdapterResult;
use crate::domain::CreditReport;
use crate::error::AdapterError;

pub const SCRAPER_TIMEOUT: Duration = Duration::from_secs(180);

#[async_trait]
pub trait CreditScraper: Send + Sync {
    async fn scrape(&self, provider: &str, encrypted_credentials: &[u8]) -> AdapterResult<CreditReport>;
}

/// Production scraper: calls a per-provider HTTP endpoint that fronts the
/// actual headless-browser automation, decrypting credentials only inside
/// this call and never logging them.
pub struct HttpCreditScraper {
    client: reqwest::Client,
    endpoint_base: String,
}

impl HttpCreditScraper {
    pub fn new(endpoint_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder().timeout(SCRAPER_TIMEOUT).build().expect("reqwest client");
        Self { client, endpoint_base: endpoint_base.into() }
    }
}

#[async_trait]
impl CreditScraper for HttpCreditScraper {
    async fn scrape(&self, provider: &str, encrypted_credentials: &[u8]) -> AdapterResult<CreditReport> {
        let url = format!("{}/scrape/{provider}", self.endpoint_base);
        let resp = self
            .client
            .post(&url)
            .body(encrypted_credentials.to_vec())
            .send()
            .await
            .map_err(|e| AdapterError::Transient(format!("scraper request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(AdapterError::PolicyBlocked("provider rejected credentials".into()));
        }
        if !resp.status().is_success() {
            return Err(AdapterError::Transient(format!("scraper returned {}", resp.status())));
        }

        resp.json::<CreditReport>()
            .await
            .map_err(|e| AdapterError::Permanent(format!("malformed scraper response: {e}")))
    }
}
