//! Dispute Orchestration Core: the workflow/scheduler/automation engine
//! that turns a credit-report upload into a time-ordered, multi-round
//! sequence of certified-mail dispute letters, tracks bureau responses
//! against statutory deadlines, coordinates external I/O, and escalates
//! automatically when deadlines lapse.

pub mod adapters;
pub mod api;
pub mod batch_pipeline;
pub mod clock;
pub mod config;
pub mod deadlines;
pub mod domain;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod persistence;
pub mod scheduler;
pub mod state_machine;
pub mod task_queue;
pub mod triggers;
pub mod workers;
