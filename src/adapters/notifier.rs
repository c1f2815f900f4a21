//! Notifier adapter (email/SMS/push): template id + recipient + variables,
//! rate-limited per recipient (§4.9).

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};

use super::AdapterResult;
use crate::error::AdapterError;

pub const NOTIFIER_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_INTERVAL_PER_RECIPIENT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
    Push,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationRequest {
    pub template_id: String,
    pub recipient: String,
    pub variables: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: Channel, request: NotificationRequest) -> AdapterResult<()>;
}

pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint_base: String,
    last_sent: DashMap<String, Instant>,
}

impl HttpNotifier {
    pub fn new(endpoint_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder().timeout(NOTIFIER_TIMEOUT).build().expect("reqwest client");
        Self { client, endpoint_base: endpoint_base.into(), last_sent: DashMap::new() }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, channel: Channel, request: NotificationRequest) -> AdapterResult<()> {
        if let Some(last) = self.last_sent.get(&request.recipient) {
            if last.elapsed() < MIN_INTERVAL_PER_RECIPIENT {
                return Err(AdapterError::Transient("recipient rate-limited".into()));
            }
        }

        let path = match channel {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        };
        let resp = self
            .client
            .post(format!("{}/{path}", self.endpoint_base))
            .json(&request)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(format!("notifier request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AdapterError::Transient(format!("notifier returned {}", resp.status())));
        }
        self.last_sent.insert(request.recipient, Instant::now());
        Ok(())
    }
}
