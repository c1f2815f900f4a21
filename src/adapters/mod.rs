//! §4.9 External Adapter Layer. Each adapter is a narrow interface
//! returning `Result<_, AdapterError>` rather than touching persistence
//! directly — the calling task handler decides what to write. Collapsed
//! to one shared error sum type instead of per-adapter exception
//! hierarchies (§9 design notes: "no shared abstract parent beyond the
//! adapter contract").

pub mod ai_writer;
pub mod mail_sftp;
pub mod notifier;
pub mod payment_gateway;
pub mod scraper;

pub use ai_writer::AiWriter;
pub use mail_sftp::MailSftp;
pub use notifier::Notifier;
pub use payment_gateway::PaymentGateway;
pub use scraper::CreditScraper;

use crate::error::AdapterError;

pub type AdapterResult<T> = Result<T, AdapterError>;
