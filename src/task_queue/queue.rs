//! §4.3 Task Queue: durable, at-least-once job runner with idempotency-key
//! dedup, lease-based acquisition, and exponential backoff with jitter.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;

use crate::clock::Clock;
use crate::domain::ids::{TaskId, TenantId};
use crate::error::CoreResult;
use crate::events::{AggregateType, DomainEvent};
use crate::persistence::{Gateway, Store};

use super::task::{Task, TaskState, TaskType};

#[derive(Clone)]
pub struct TaskQueue {
    gateway: Gateway,
    clock: Arc<dyn Clock>,
    backoff_base_s: u64,
    backoff_cap_s: u64,
}

impl TaskQueue {
    pub fn new(gateway: Gateway, clock: Arc<dyn Clock>, backoff_base_s: u64, backoff_cap_s: u64) -> Self {
        Self { gateway, clock, backoff_base_s, backoff_cap_s }
    }

    fn store(&self) -> &Store {
        self.gateway.store()
    }

    /// Enqueues a task; calling again with the same `(type, idempotency_key)`
    /// returns the existing id without re-enqueueing (§4.3, §8 duplicate
    /// webhook property).
    pub fn enqueue(
        &self,
        tenant_id: TenantId,
        task_type: TaskType,
        payload: Value,
        run_at: DateTime<Utc>,
        idempotency_key: &str,
        max_attempts: u32,
    ) -> CoreResult<TaskId> {
        let idem_key = Task::idempotency_storage_key(task_type, idempotency_key);
        if let Some(existing_id) = self.store().get::<TaskId>(&idem_key)? {
            return Ok(existing_id);
        }

        let task = Task {
            id: TaskId::new(),
            tenant_id,
            task_type,
            payload,
            run_at,
            attempt: 0,
            max_attempts,
            state: TaskState::Ready,
            last_error: None,
            idempotency_key: idempotency_key.to_string(),
            leased_by: None,
            lease_expires_at: None,
        };

        self.store().put(&Task::storage_key(task.id), &task)?;
        self.store().put(&idem_key, &task.id)?;
        Ok(task.id)
    }

    /// Acquires the oldest eligible task (`ready`, `run_at <= now`, or whose
    /// lease has expired) and marks it `running` under `worker_id`.
    pub fn lease(&self, worker_id: &str, ttl: ChronoDuration) -> CoreResult<Option<Task>> {
        let now = self.clock.now();
        let mut candidates: Vec<Task> = self
            .store()
            .scan_prefix::<Task>("task:")?
            .into_iter()
            .filter(|t| t.run_at <= now)
            .filter(|t| match t.state {
                TaskState::Ready => true,
                TaskState::Running => t.lease_expires_at.map(|exp| exp <= now).unwrap_or(true),
                _ => false,
            })
            .collect();
        candidates.sort_by_key(|t| t.run_at);

        let Some(mut task) = candidates.into_iter().next() else {
            return Ok(None);
        };

        task.state = TaskState::Running;
        task.leased_by = Some(worker_id.to_string());
        task.lease_expires_at = Some(now + ttl);
        self.store().put(&Task::storage_key(task.id), &task)?;
        Ok(Some(task))
    }

    pub fn ack_success(&self, task_id: TaskId) -> CoreResult<()> {
        if let Some(mut task) = self.store().get::<Task>(&Task::storage_key(task_id))? {
            task.state = TaskState::Succeeded;
            task.leased_by = None;
            task.lease_expires_at = None;
            self.store().put(&Task::storage_key(task_id), &task)?;
        }
        Ok(())
    }

    /// Records a failed attempt. If `max_attempts` is exhausted the task
    /// becomes `dead` and a `task.dead` event fires; otherwise it is
    /// rescheduled per the exponential backoff policy.
    pub fn ack_failure(&self, task_id: TaskId, error: impl Into<String>) -> CoreResult<Vec<DomainEvent>> {
        let Some(mut task) = self.store().get::<Task>(&Task::storage_key(task_id))? else {
            return Ok(Vec::new());
        };
        task.attempt += 1;
        task.last_error = Some(error.into());
        task.leased_by = None;
        task.lease_expires_at = None;

        let events = if task.attempt >= task.max_attempts {
            task.state = TaskState::Dead;
            let key = Task::storage_key(task_id);
            let staged = task.clone();
            let payload = serde_json::json!({
                "task_type": task.task_type,
                "last_error": task.last_error,
            });
            self.gateway.run(task.tenant_id, task_id.0, move |tx| {
                tx.stage_write(&key, &staged)?;
                tx.stage_event(AggregateType::Task, "task.dead", &payload)
            })?
        } else {
            task.state = TaskState::Ready;
            task.run_at = self.clock.now() + self.backoff_delay(task.attempt);
            self.store().put(&Task::storage_key(task_id), &task)?;
            Vec::new()
        };

        Ok(events)
    }

    /// Exponential backoff, base 30s, cap 1h, jitter ±25% (§4.3).
    fn backoff_delay(&self, attempt: u32) -> ChronoDuration {
        let raw = self.backoff_base_s.saturating_mul(1u64 << attempt.min(20)).min(self.backoff_cap_s);
        let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
        let jittered = (raw as f64 * (1.0 + jitter_frac)).max(0.0) as i64;
        ChronoDuration::seconds(jittered)
    }

    pub fn get(&self, task_id: TaskId) -> CoreResult<Option<Task>> {
        self.store().get(&Task::storage_key(task_id))
    }
}
