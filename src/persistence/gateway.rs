//! §4.2 Persistence Gateway: `run(tx, fn)` stages writes and domain events
//! inside one transaction; on commit, events are appended to the
//! append-only log and handed to the Event Bus. Per-aggregate writes are
//! guarded by an optimistic version check with a three-attempt jittered
//! retry budget before surfacing `CoreError::Conflict`.

use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::ids::TenantId;
use crate::error::{CoreError, CoreResult};
use crate::events::{AggregateType, DomainEvent, EventBus};

use super::store::Store;

pub struct StagedWrite {
    pub key: String,
    pub value: Value,
}

/// Staged writes and events for one aggregate transition, handed to the
/// caller's closure to populate. Nothing here is visible to other readers
/// until `Gateway::run` commits it.
pub struct Transaction {
    pub tenant: TenantId,
    aggregate_id: Uuid,
    writes: Vec<StagedWrite>,
    events: Vec<(AggregateType, String, Value)>,
}

impl Transaction {
    pub fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    pub fn stage_write<T: serde::Serialize>(&mut self, key: impl Into<String>, value: &T) -> CoreResult<()> {
        self.writes.push(StagedWrite { key: key.into(), value: serde_json::to_value(value)? });
        Ok(())
    }

    pub fn stage_event<T: serde::Serialize>(
        &mut self,
        aggregate_type: AggregateType,
        event_type: impl Into<String>,
        payload: &T,
    ) -> CoreResult<()> {
        self.events.push((aggregate_type, event_type.into(), serde_json::to_value(payload)?));
        Ok(())
    }
}

#[derive(Clone)]
pub struct Gateway {
    store: Store,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    pub fn new(store: Store, bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self { store, bus, clock }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs `f` against a fresh `Transaction` for `aggregate_id`, retrying
    /// on optimistic-version conflicts up to three times with jittered
    /// backoff. `f` must be pure with respect to external side effects:
    /// only the staged writes/events it returns are committed.
    pub fn run<F>(&self, tenant: TenantId, aggregate_id: Uuid, f: F) -> CoreResult<Vec<DomainEvent>>
    where
        F: Fn(&mut Transaction) -> CoreResult<()>,
    {
        let version_key = format!("version:{aggregate_id}");
        let mut attempt = 0u32;
        loop {
            let expected_raw = self.store.get_raw(&version_key)?;
            let expected_version: u64 = match &expected_raw {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => 0,
            };

            let mut tx = Transaction { tenant, aggregate_id, writes: Vec::new(), events: Vec::new() };
            f(&mut tx)?;

            let next_version = expected_version + 1;
            let swapped = self.store.cas(&version_key, expected_raw.as_deref(), &next_version)?;
            if !swapped {
                attempt += 1;
                if attempt >= 3 {
                    return Err(CoreError::Conflict(format!(
                        "optimistic version conflict on aggregate {aggregate_id} after 3 attempts"
                    )));
                }
                let jitter_ms = rand::thread_rng().gen_range(10..80) * attempt;
                std::thread::sleep(Duration::from_millis(jitter_ms as u64));
                continue;
            }

            for write in &tx.writes {
                self.store.put(&write.key, &write.value)?;
            }

            let seq_key = format!("seq:{aggregate_id}");
            let mut next_seq: u64 = self.store.get(&seq_key)?.unwrap_or(0);
            let mut committed = Vec::with_capacity(tx.events.len());
            for (aggregate_type, event_type, payload) in tx.events {
                next_seq += 1;
                let event = DomainEvent {
                    id: Uuid::new_v4(),
                    tenant,
                    aggregate_type,
                    aggregate_id,
                    event_type,
                    sequence: next_seq,
                    commit_ts: self.clock.now(),
                    payload,
                };
                self.store.put(&format!("event:{aggregate_id}:{next_seq:020}"), &event)?;
                committed.push(event);
            }
            self.store.put(&seq_key, &next_seq)?;

            self.bus.publish_all(committed.clone());
            return Ok(committed);
        }
    }

    pub fn events_for(&self, aggregate_id: Uuid) -> CoreResult<Vec<DomainEvent>> {
        self.store.scan_prefix(&format!("event:{aggregate_id}:"))
    }
}
