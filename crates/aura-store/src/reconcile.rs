//! Realtime reconciliation.
//!
//! Merges insert/update/delete change events into the in-memory
//! collections. Inserts deduplicate against rows the optimistic path
//! already placed; updates are shallow merges that preserve locally
//! embedded fields; a per-row version gate drops events that predate a
//! local mutation still in flight.
//!
//! The reconciler is stateless between events; subscription lifecycle is
//! owned by the caller (subscribe when an owner id appears, drop the
//! handle on owner change or teardown).

use aura_core::model::{Tag, Task, TaskGroup, UserSettings};
use aura_core::traits::{ChangeEvent, ChangeKind};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use crate::groups::GroupStore;
use crate::settings::SettingsStore;
use crate::tags::TagStore;
use crate::tasks::TaskStore;

/// Per-row version counters: a mutation `begin`s a version before its
/// remote call and `settle`s it after (success or rollback). While a row
/// has an unsettled version, incoming update events for it are stale by
/// definition and are dropped.
#[derive(Debug, Default)]
pub(crate) struct VersionGate {
    versions: HashMap<Uuid, u64>,
    settled: HashMap<Uuid, u64>,
    counter: u64,
}

impl VersionGate {
    pub(crate) fn begin(&mut self, id: Uuid) -> u64 {
        self.counter += 1;
        self.versions.insert(id, self.counter);
        self.counter
    }

    pub(crate) fn settle(&mut self, id: Uuid, version: u64) {
        let entry = self.settled.entry(id).or_insert(0);
        if version > *entry {
            *entry = version;
        }
    }

    pub(crate) fn is_stale(&self, id: Uuid) -> bool {
        let local = self.versions.get(&id).copied().unwrap_or(0);
        let settled = self.settled.get(&id).copied().unwrap_or(0);
        local > settled
    }

    pub(crate) fn forget(&mut self, id: Uuid) {
        self.versions.remove(&id);
        self.settled.remove(&id);
    }
}

/// Row id from a change payload. Deletes are only guaranteed to carry it.
fn row_id(row: &Value) -> Option<Uuid> {
    row.get("id")
        .or_else(|| row.get("user_id"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

fn decode<T: serde::de::DeserializeOwned>(row: &Value, entity: &str) -> Option<T> {
    match serde_json::from_value(row.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("reconcile: dropping malformed {entity} row: {e}");
            None
        }
    }
}

impl TaskStore {
    /// Merge one realtime change into the task collection.
    pub fn apply_change(&mut self, event: &ChangeEvent) {
        let Some(id) = row_id(&event.row) else {
            warn!("reconcile: task event without id");
            return;
        };
        match event.kind {
            ChangeKind::Insert => {
                if self.items.iter().any(|t| t.id == id) {
                    return; // optimistic add already placed it
                }
                if let Some(task) = decode::<Task>(&event.row, "task") {
                    self.items.push(task);
                    self.sort();
                }
            }
            ChangeKind::Update => {
                if self.gate.is_stale(id) {
                    return; // a newer local mutation is in flight
                }
                let Some(incoming) = decode::<Task>(&event.row, "task") else {
                    return;
                };
                if let Some(existing) = self.items.iter_mut().find(|t| t.id == id) {
                    // Core fields only; embedded subtasks/tags are local.
                    let subtasks = std::mem::take(&mut existing.subtasks);
                    let tags = std::mem::take(&mut existing.tags);
                    *existing = incoming;
                    existing.subtasks = subtasks;
                    existing.tags = tags;
                    self.sort();
                }
            }
            ChangeKind::Delete => {
                self.items.retain(|t| t.id != id);
                self.gate.forget(id);
            }
        }
    }
}

impl GroupStore {
    /// Merge one realtime change into the group collection.
    pub fn apply_change(&mut self, event: &ChangeEvent) {
        let Some(id) = row_id(&event.row) else {
            warn!("reconcile: group event without id");
            return;
        };
        match event.kind {
            ChangeKind::Insert => {
                if self.items.iter().any(|g| g.id == id) {
                    return;
                }
                if let Some(group) = decode::<TaskGroup>(&event.row, "group") {
                    self.items.push(group);
                    self.sort();
                }
            }
            ChangeKind::Update => {
                if self.gate.is_stale(id) {
                    return;
                }
                if let Some(incoming) = decode::<TaskGroup>(&event.row, "group") {
                    if let Some(existing) = self.items.iter_mut().find(|g| g.id == id) {
                        *existing = incoming;
                        self.sort();
                    }
                }
            }
            ChangeKind::Delete => {
                self.items.retain(|g| g.id != id);
                self.gate.forget(id);
            }
        }
    }
}

impl TagStore {
    /// Merge one realtime change into the tag collection.
    pub fn apply_change(&mut self, event: &ChangeEvent) {
        let Some(id) = row_id(&event.row) else {
            warn!("reconcile: tag event without id");
            return;
        };
        match event.kind {
            ChangeKind::Insert => {
                if self.items.iter().any(|t| t.id == id) {
                    return;
                }
                if let Some(tag) = decode::<Tag>(&event.row, "tag") {
                    self.items.push(tag);
                    self.sort();
                }
            }
            ChangeKind::Update => {
                if self.gate.is_stale(id) {
                    return;
                }
                if let Some(incoming) = decode::<Tag>(&event.row, "tag") {
                    if let Some(existing) = self.items.iter_mut().find(|t| t.id == id) {
                        *existing = incoming;
                        self.sort();
                    }
                }
            }
            ChangeKind::Delete => {
                self.items.retain(|t| t.id != id);
                self.gate.forget(id);
            }
        }
    }
}

impl SettingsStore {
    /// Merge one realtime change into the settings row.
    pub fn apply_change(&mut self, event: &ChangeEvent) {
        let Some(id) = row_id(&event.row) else {
            return;
        };
        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                if self.gate.is_stale(id) {
                    return;
                }
                if let Some(incoming) = decode::<UserSettings>(&event.row, "settings") {
                    self.settings = Some(incoming);
                }
            }
            ChangeKind::Delete => {
                if self.settings.as_ref().map(|s| s.user_id) == Some(id) {
                    self.settings = None;
                    self.gate.forget(id);
                }
            }
        }
    }
}
