//! Entities of §3: the shapes every other component reads and writes.

pub mod audit;
pub mod client;
pub mod credit_report;
pub mod deadline;
pub mod dispute_item;
pub mod ids;
pub mod letter;
pub mod letter_batch;
pub mod payment;
pub mod tenant;

pub use audit::AuditLog;
pub use client::{Client, CroaState, LifecycleStage};
pub use credit_report::{Bureau, CreditReport};
pub use deadline::{Deadline, DeadlineKind};
pub use dispute_item::{DisputeItem, DisputeStatus, EscalationStage};
pub use letter::{Letter, LetterKind, LetterStatus, Recipient};
pub use letter_batch::{BatchStatus, LetterBatch};
pub use payment::{Payment, PaymentKind, PaymentStatus};
pub use tenant::Tenant;
