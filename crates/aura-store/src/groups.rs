//! Task group store.

use aura_core::error::AuraError;
use aura_core::model::TaskGroup;
use aura_core::traits::{Collection, Gateway};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::reconcile::VersionGate;

/// Partial group update.
#[derive(Debug, Clone, Default)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub emoji: Option<Option<String>>,
}

pub struct GroupStore {
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) items: Vec<TaskGroup>,
    pub(crate) loading: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) gate: VersionGate,
}

impl GroupStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            items: Vec::new(),
            loading: false,
            last_error: None,
            gate: VersionGate::default(),
        }
    }

    /// Groups ordered by creation time.
    pub fn groups(&self) -> &[TaskGroup] {
        &self.items
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn sort(&mut self) {
        self.items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    fn record_error(&mut self, context: &str, err: &AuraError) {
        warn!("groups: {context}: {err}");
        self.last_error = Some(format!("{context}: {err}"));
    }

    pub async fn load(&mut self, owner: Option<Uuid>) -> bool {
        let Some(owner) = owner else {
            self.record_error("load groups", &AuraError::Unauthenticated);
            return false;
        };
        self.loading = true;
        let result = self.gateway.select(Collection::Groups, owner).await;
        self.loading = false;
        match result {
            Ok(rows) => {
                self.items = rows
                    .into_iter()
                    .filter_map(|row| match serde_json::from_value(row) {
                        Ok(group) => Some(group),
                        Err(e) => {
                            warn!("groups: skipping malformed row: {e}");
                            None
                        }
                    })
                    .collect();
                self.sort();
                self.last_error = None;
                true
            }
            Err(e) => {
                self.record_error("load groups", &e);
                false
            }
        }
    }

    pub async fn add(
        &mut self,
        owner: Option<Uuid>,
        name: impl Into<String>,
        emoji: Option<String>,
    ) -> Option<TaskGroup> {
        let Some(owner) = owner else {
            self.record_error("add group", &AuraError::Unauthenticated);
            return None;
        };
        let mut group = TaskGroup::new(owner, name);
        group.emoji = emoji;

        let version = self.gate.begin(group.id);
        self.items.push(group.clone());
        self.sort();

        let row = serde_json::to_value(&group).expect("group serializes");
        match self.gateway.insert(Collection::Groups, row).await {
            Ok(_) => {
                self.gate.settle(group.id, version);
                self.last_error = None;
                Some(group)
            }
            Err(e) => {
                self.items.retain(|g| g.id != group.id);
                self.gate.settle(group.id, version);
                self.record_error("add group", &e);
                None
            }
        }
    }

    pub async fn update(
        &mut self,
        owner: Option<Uuid>,
        id: Uuid,
        patch: GroupPatch,
    ) -> Option<TaskGroup> {
        let Some(owner) = owner else {
            self.record_error("update group", &AuraError::Unauthenticated);
            return None;
        };
        let Some(index) = self.items.iter().position(|g| g.id == id && g.owner_id == owner)
        else {
            self.record_error("update group", &AuraError::Unauthenticated);
            return None;
        };

        let snapshot = self.items[index].clone();
        let version = self.gate.begin(id);
        {
            let group = &mut self.items[index];
            if let Some(name) = &patch.name {
                group.name = name.clone();
            }
            if let Some(emoji) = &patch.emoji {
                group.emoji = emoji.clone();
            }
        }

        let mut row = serde_json::Map::new();
        if patch.name.is_some() {
            row.insert("name".into(), json!(self.items[index].name));
        }
        if patch.emoji.is_some() {
            row.insert("emoji".into(), json!(self.items[index].emoji));
        }

        match self
            .gateway
            .update(Collection::Groups, id, serde_json::Value::Object(row))
            .await
        {
            Ok(_) => {
                self.gate.settle(id, version);
                self.last_error = None;
                Some(self.items[index].clone())
            }
            Err(e) => {
                self.items[index] = snapshot;
                self.gate.settle(id, version);
                self.record_error("update group", &e);
                None
            }
        }
    }

    /// Delete a group. Task detachment is handled by the caller (see
    /// `AppContext::remove_group`); tasks are never deleted with the group.
    pub async fn remove(&mut self, owner: Option<Uuid>, id: Uuid) -> bool {
        let Some(owner) = owner else {
            self.record_error("remove group", &AuraError::Unauthenticated);
            return false;
        };
        let Some(index) = self.items.iter().position(|g| g.id == id && g.owner_id == owner)
        else {
            self.record_error("remove group", &AuraError::Unauthenticated);
            return false;
        };

        let snapshot = self.items.remove(index);
        match self.gateway.delete(Collection::Groups, id).await {
            Ok(()) => {
                self.gate.forget(id);
                self.last_error = None;
                true
            }
            Err(e) if e.is_not_found() => {
                self.gate.forget(id);
                self.record_error("remove group", &e);
                true
            }
            Err(e) => {
                self.items.insert(index.min(self.items.len()), snapshot);
                self.sort();
                self.record_error("remove group", &e);
                false
            }
        }
    }
}
