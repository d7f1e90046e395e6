//! Application context.
//!
//! An explicit object owning the entity stores and the gateway handle.
//! Tests (and any embedder) instantiate isolated contexts; there is no
//! process-wide singleton.

use aura_core::traits::{Collection, Gateway, Subscription};
use std::sync::Arc;
use uuid::Uuid;

use crate::groups::GroupStore;
use crate::settings::SettingsStore;
use crate::tags::TagStore;
use crate::tasks::TaskStore;

pub struct AppContext {
    gateway: Arc<dyn Gateway>,
    pub tasks: TaskStore,
    pub groups: GroupStore,
    pub tags: TagStore,
    pub settings: SettingsStore,
}

impl AppContext {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            tasks: TaskStore::new(gateway.clone()),
            groups: GroupStore::new(gateway.clone()),
            tags: TagStore::new(gateway.clone()),
            settings: SettingsStore::new(gateway.clone()),
            gateway,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    /// Load every collection for `owner`.
    pub async fn load_all(&mut self, owner: Option<Uuid>) -> bool {
        let tasks = self.tasks.load(owner).await;
        let groups = self.groups.load(owner).await;
        let tags = self.tags.load(owner).await;
        let settings = self.settings.load_or_create(owner).await;
        tasks && groups && tags && settings
    }

    /// Open the change feeds for `owner`. Dropping a previous set of
    /// handles (e.g. on owner change) tears the old feeds down.
    pub fn subscribe_all(&self, owner: Uuid) -> EntityFeeds {
        EntityFeeds {
            tasks: self.gateway.subscribe(Collection::Tasks, owner),
            groups: self.gateway.subscribe(Collection::Groups, owner),
            tags: self.gateway.subscribe(Collection::Tags, owner),
            settings: self.gateway.subscribe(Collection::Settings, owner),
        }
    }

    /// Drain queued change events from `feeds` into the stores.
    pub fn pump(&mut self, feeds: &mut EntityFeeds) {
        while let Some(event) = feeds.tasks.try_recv() {
            self.tasks.apply_change(&event);
        }
        while let Some(event) = feeds.groups.try_recv() {
            self.groups.apply_change(&event);
        }
        while let Some(event) = feeds.tags.try_recv() {
            self.tags.apply_change(&event);
        }
        while let Some(event) = feeds.settings.try_recv() {
            self.settings.apply_change(&event);
        }
    }

    /// Delete a group and detach its tasks (they become ungrouped, never
    /// deleted).
    pub async fn remove_group(&mut self, owner: Option<Uuid>, group_id: Uuid) -> bool {
        if !self.groups.remove(owner, group_id).await {
            return false;
        }
        self.tasks.clear_group(owner, group_id).await
    }

    /// Delete a tag and strip it from the embedded task tag lists.
    pub async fn remove_tag(&mut self, owner: Option<Uuid>, tag_id: Uuid) -> bool {
        if !self.tags.remove(owner, tag_id).await {
            return false;
        }
        self.tasks.strip_tag(tag_id);
        true
    }
}

/// Live change feeds for one owner.
pub struct EntityFeeds {
    pub tasks: Subscription,
    pub groups: Subscription,
    pub tags: Subscription,
    pub settings: Subscription,
}
