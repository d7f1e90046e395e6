//! Tag store.

use aura_core::error::AuraError;
use aura_core::model::{Tag, TagColor};
use aura_core::traits::{Collection, Gateway};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::reconcile::VersionGate;

/// Partial tag update.
#[derive(Debug, Clone, Default)]
pub struct TagPatch {
    pub name: Option<String>,
    pub color: Option<TagColor>,
}

pub struct TagStore {
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) items: Vec<Tag>,
    pub(crate) loading: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) gate: VersionGate,
}

impl TagStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            items: Vec::new(),
            loading: false,
            last_error: None,
            gate: VersionGate::default(),
        }
    }

    /// Tags ordered by name.
    pub fn tags(&self) -> &[Tag] {
        &self.items
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn sort(&mut self) {
        self.items.sort_by(|a, b| a.name.cmp(&b.name));
    }

    fn record_error(&mut self, context: &str, err: &AuraError) {
        warn!("tags: {context}: {err}");
        self.last_error = Some(format!("{context}: {err}"));
    }

    pub async fn load(&mut self, owner: Option<Uuid>) -> bool {
        let Some(owner) = owner else {
            self.record_error("load tags", &AuraError::Unauthenticated);
            return false;
        };
        self.loading = true;
        let result = self.gateway.select(Collection::Tags, owner).await;
        self.loading = false;
        match result {
            Ok(rows) => {
                self.items = rows
                    .into_iter()
                    .filter_map(|row| match serde_json::from_value(row) {
                        Ok(tag) => Some(tag),
                        Err(e) => {
                            warn!("tags: skipping malformed row: {e}");
                            None
                        }
                    })
                    .collect();
                self.sort();
                self.last_error = None;
                true
            }
            Err(e) => {
                self.record_error("load tags", &e);
                false
            }
        }
    }

    pub async fn add(
        &mut self,
        owner: Option<Uuid>,
        name: impl Into<String>,
        color: TagColor,
    ) -> Option<Tag> {
        let Some(owner) = owner else {
            self.record_error("add tag", &AuraError::Unauthenticated);
            return None;
        };
        let tag = Tag::new(owner, name, color);

        let version = self.gate.begin(tag.id);
        self.items.push(tag.clone());
        self.sort();

        let row = serde_json::to_value(&tag).expect("tag serializes");
        match self.gateway.insert(Collection::Tags, row).await {
            Ok(_) => {
                self.gate.settle(tag.id, version);
                self.last_error = None;
                Some(tag)
            }
            Err(e) => {
                self.items.retain(|t| t.id != tag.id);
                self.gate.settle(tag.id, version);
                self.record_error("add tag", &e);
                None
            }
        }
    }

    pub async fn update(&mut self, owner: Option<Uuid>, id: Uuid, patch: TagPatch) -> Option<Tag> {
        let Some(owner) = owner else {
            self.record_error("update tag", &AuraError::Unauthenticated);
            return None;
        };
        let Some(index) = self.items.iter().position(|t| t.id == id && t.owner_id == owner)
        else {
            self.record_error("update tag", &AuraError::Unauthenticated);
            return None;
        };

        let snapshot = self.items[index].clone();
        let version = self.gate.begin(id);
        {
            let tag = &mut self.items[index];
            if let Some(name) = &patch.name {
                tag.name = name.clone();
            }
            if let Some(color) = patch.color {
                tag.color = color;
            }
        }
        self.sort();

        let mut row = serde_json::Map::new();
        if let Some(name) = &patch.name {
            row.insert("name".into(), json!(name));
        }
        if let Some(color) = patch.color {
            row.insert("color".into(), json!(color));
        }

        match self
            .gateway
            .update(Collection::Tags, id, serde_json::Value::Object(row))
            .await
        {
            Ok(_) => {
                self.gate.settle(id, version);
                self.last_error = None;
                self.items.iter().find(|t| t.id == id).cloned()
            }
            Err(e) => {
                if let Some(tag) = self.items.iter_mut().find(|t| t.id == id) {
                    *tag = snapshot;
                }
                self.sort();
                self.gate.settle(id, version);
                self.record_error("update tag", &e);
                None
            }
        }
    }

    /// Delete a tag. Join rows cascade on the backend; embedded tag lists
    /// are stripped by the caller (see `AppContext::remove_tag`).
    pub async fn remove(&mut self, owner: Option<Uuid>, id: Uuid) -> bool {
        let Some(owner) = owner else {
            self.record_error("remove tag", &AuraError::Unauthenticated);
            return false;
        };
        let Some(index) = self.items.iter().position(|t| t.id == id && t.owner_id == owner)
        else {
            self.record_error("remove tag", &AuraError::Unauthenticated);
            return false;
        };

        let snapshot = self.items.remove(index);
        match self.gateway.delete(Collection::Tags, id).await {
            Ok(()) => {
                self.gate.forget(id);
                self.last_error = None;
                true
            }
            Err(e) if e.is_not_found() => {
                self.gate.forget(id);
                self.record_error("remove tag", &e);
                true
            }
            Err(e) => {
                self.items.insert(index.min(self.items.len()), snapshot);
                self.sort();
                self.record_error("remove tag", &e);
                false
            }
        }
    }
}
