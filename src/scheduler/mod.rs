//! §4.4 Scheduler: cron-style and one-shot entries, restart-safe because
//! `next_fire_at` is persisted and recomputed purely from wall time.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule as CronExpr;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use crate::clock::Clock;
use crate::domain::ids::{ScheduleId, TenantId};
use crate::error::{CoreError, CoreResult};
use crate::persistence::Store;
use crate::task_queue::{TaskQueue, TaskType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScheduleKind {
    Cron(String),
    OneShot(DateTime<Utc>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub tenant_id: TenantId,
    pub kind: ScheduleKind,
    pub task_type: TaskType,
    pub payload_template: Value,
    pub next_fire_at: DateTime<Utc>,
    pub fired_once: bool,
}

impl Schedule {
    fn storage_key(id: ScheduleId) -> String {
        format!("schedule:{id}")
    }
}

pub struct Scheduler {
    store: Store,
    task_queue: TaskQueue,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(store: Store, task_queue: TaskQueue, clock: Arc<dyn Clock>) -> Self {
        Self { store, task_queue, clock }
    }

    pub fn register_cron(
        &self,
        tenant_id: TenantId,
        cron_expr: &str,
        task_type: TaskType,
        payload_template: Value,
    ) -> CoreResult<ScheduleId> {
        let expr = CronExpr::from_str(cron_expr)
            .map_err(|e| CoreError::Validation(format!("invalid cron expression: {e}")))?;
        let next = expr
            .after(&self.clock.now())
            .next()
            .ok_or_else(|| CoreError::Validation("cron expression never fires".into()))?;

        let schedule = Schedule {
            id: ScheduleId::new(),
            tenant_id,
            kind: ScheduleKind::Cron(cron_expr.to_string()),
            task_type,
            payload_template,
            next_fire_at: next,
            fired_once: false,
        };
        self.store.put(&Schedule::storage_key(schedule.id), &schedule)?;
        Ok(schedule.id)
    }

    pub fn register_one_shot(
        &self,
        tenant_id: TenantId,
        at: DateTime<Utc>,
        task_type: TaskType,
        payload_template: Value,
    ) -> CoreResult<ScheduleId> {
        let schedule = Schedule {
            id: ScheduleId::new(),
            tenant_id,
            kind: ScheduleKind::OneShot(at),
            task_type,
            payload_template,
            next_fire_at: at,
            fired_once: false,
        };
        self.store.put(&Schedule::storage_key(schedule.id), &schedule)?;
        Ok(schedule.id)
    }

    /// Materializes any entry whose `next_fire_at` has landed within the
    /// tick window into a Task, via idempotency key `schedule:{id}:{fire_ts}`
    /// so a missed fire produces at most one catch-up task (§4.4 drift
    /// tolerance) and a process restart never double-fires.
    pub fn tick(&self) -> CoreResult<usize> {
        let now = self.clock.now();
        let schedules: Vec<Schedule> = self.store.scan_prefix("schedule:")?;
        let mut fired = 0;

        for mut schedule in schedules {
            if schedule.fired_once && matches!(schedule.kind, ScheduleKind::OneShot(_)) {
                continue;
            }
            if schedule.next_fire_at > now {
                continue;
            }

            let idem_key = format!("schedule:{}:{}", schedule.id, schedule.next_fire_at.timestamp());
            self.task_queue.enqueue(
                schedule.tenant_id,
                schedule.task_type,
                schedule.payload_template.clone(),
                schedule.next_fire_at,
                &idem_key,
                5,
            )?;
            fired += 1;

            match &schedule.kind {
                ScheduleKind::OneShot(_) => schedule.fired_once = true,
                ScheduleKind::Cron(expr) => {
                    let parsed = CronExpr::from_str(expr)
                        .map_err(|e| CoreError::Internal(format!("corrupted cron expression: {e}")))?;
                    schedule.next_fire_at = parsed
                        .after(&schedule.next_fire_at)
                        .next()
                        .unwrap_or(schedule.next_fire_at + ChronoDuration::days(3650));
                }
            }
            self.store.put(&Schedule::storage_key(schedule.id), &schedule)?;
        }

        Ok(fired)
    }
}
