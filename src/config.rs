//! Recognized environment keys (§6), each with its default, collected into
//! one typed `Config` rather than read ad hoc throughout the codebase.

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db_path: String,
    pub event_retention_days: u32,
    pub task_backoff_base_s: u64,
    pub task_backoff_cap_s: u64,
    pub tenant_max_concurrency: usize,
    pub letter_cost_minor: i64,
    pub sftp_host: String,
    pub sftp_user: String,
    pub sftp_key_ref: String,
    pub ai_endpoint: String,
    pub ai_budget_tokens: u64,
    pub scraper_endpoint: String,
    pub payment_endpoint: String,
    pub notifier_endpoint: String,
    pub payment_webhook_secret: String,
    pub business_tz: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("CORE_DB_URL").unwrap_or_else(|_| "./data/core.sled".into()),
            event_retention_days: env_parse("CORE_EVENT_RETENTION_DAYS", 365),
            task_backoff_base_s: env_parse("CORE_TASK_BACKOFF_BASE_S", 30),
            task_backoff_cap_s: env_parse("CORE_TASK_BACKOFF_CAP_S", 3600),
            tenant_max_concurrency: env_parse("CORE_TENANT_MAX_CONCURRENCY", 8),
            letter_cost_minor: env_parse("CORE_LETTER_COST_MINOR", 1100),
            sftp_host: std::env::var("CORE_SFTP_HOST").unwrap_or_default(),
            sftp_user: std::env::var("CORE_SFTP_USER").unwrap_or_default(),
            sftp_key_ref: std::env::var("CORE_SFTP_KEY_REF").unwrap_or_default(),
            ai_endpoint: std::env::var("CORE_AI_ENDPOINT").unwrap_or_default(),
            ai_budget_tokens: env_parse("CORE_AI_BUDGET_TOKENS", 50_000),
            scraper_endpoint: std::env::var("CORE_SCRAPER_ENDPOINT").unwrap_or_default(),
            payment_endpoint: std::env::var("CORE_PAYMENT_ENDPOINT").unwrap_or_default(),
            notifier_endpoint: std::env::var("CORE_NOTIFIER_ENDPOINT").unwrap_or_default(),
            payment_webhook_secret: std::env::var("CORE_PAYMENT_WEBHOOK_SECRET").unwrap_or_default(),
            business_tz: std::env::var("CORE_BUSINESS_TZ").unwrap_or_else(|_| "America/New_York".into()),
        }
    }

    pub fn business_tz(&self) -> Tz {
        self.business_tz.parse().unwrap_or(chrono_tz::America::New_York)
    }

    /// US federal holidays the CROA/SFTP business-day math must skip.
    /// A static table rather than a calculation: Congress moves these.
    pub fn federal_holidays(year: i32) -> Vec<NaiveDate> {
        vec![
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 1, 19),
            NaiveDate::from_ymd_opt(year, 2, 16),
            NaiveDate::from_ymd_opt(year, 5, 25),
            NaiveDate::from_ymd_opt(year, 6, 19),
            NaiveDate::from_ymd_opt(year, 7, 3),
            NaiveDate::from_ymd_opt(year, 9, 7),
            NaiveDate::from_ymd_opt(year, 10, 12),
            NaiveDate::from_ymd_opt(year, 11, 11),
            NaiveDate::from_ymd_opt(year, 11, 26),
            NaiveDate::from_ymd_opt(year, 12, 25),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
