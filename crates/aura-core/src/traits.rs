//! Boundary contracts for the external collaborators.
//!
//! The stores, reconciler, migration controller, and AI policy depend only
//! on these traits; concrete gateways and providers live in their own
//! crates.

use crate::error::AuraError;
use crate::model::Session;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Entity collections exposed by the remote data gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tasks,
    Subtasks,
    Groups,
    Tags,
    TaskTags,
    Settings,
    Profiles,
    AdminKeys,
}

impl Collection {
    /// Remote table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Subtasks => "subtasks",
            Collection::Groups => "task_groups",
            Collection::Tags => "tags",
            Collection::TaskTags => "task_tags",
            Collection::Settings => "user_settings",
            Collection::Profiles => "user_profiles",
            Collection::AdminKeys => "admin_api_keys",
        }
    }
}

/// Kind of a realtime change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single realtime change delivered on a subscription.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// The affected row as the gateway delivered it. For deletes only the
    /// `id` field is guaranteed present.
    pub row: Value,
}

/// A live change feed for one (collection, owner) pair.
///
/// Dropping the subscription unsubscribes: the gateway prunes the feed when
/// delivery to it fails.
pub struct Subscription {
    rx: tokio::sync::mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(rx: tokio::sync::mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next change. `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Drain any change that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

/// Remote data gateway — the BaaS client.
///
/// Row-level CRUD plus realtime change subscription, scoped to the caller's
/// identity by the backend's own access-control layer. Rows travel as JSON
/// values; the stores deserialize into typed models.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fetch all rows of `collection` owned by `owner`.
    async fn select(&self, collection: Collection, owner: Uuid) -> Result<Vec<Value>, AuraError>;

    /// Insert one row, returning the stored representation.
    async fn insert(&self, collection: Collection, row: Value) -> Result<Value, AuraError>;

    /// Patch one row by id, returning the stored representation.
    /// Fails with [`AuraError::NotFound`] when the row is gone.
    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Value,
    ) -> Result<Value, AuraError>;

    /// Delete one row by id. Fails with [`AuraError::NotFound`] when the
    /// row is gone.
    async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), AuraError>;

    /// Subscribe to changes for `(collection, owner)`. Re-subscribing for
    /// the same pair tears down the previous feed first, so a channel is
    /// never delivered twice.
    fn subscribe(&self, collection: Collection, owner: Uuid) -> Subscription;

    /// The current session, if any.
    async fn session(&self) -> Result<Option<Session>, AuraError>;

    /// Create an anonymous identity and session.
    async fn sign_in_anonymously(&self) -> Result<Session, AuraError>;
}

/// AI text-generation provider — a single round-trip completion call.
///
/// The response is opaque text; callers pattern-match it for a JSON object
/// or an emoji glyph and classify errors by message substring.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str, api_key: &str)
        -> Result<String, AuraError>;
}

/// Durable local string-keyed storage (the browser-origin storage in the
/// original deployment; a JSON file here).
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), AuraError>;
    fn remove(&self, key: &str) -> Result<(), AuraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(Collection::Tasks.table_name(), "tasks");
        assert_eq!(Collection::Groups.table_name(), "task_groups");
        assert_eq!(Collection::AdminKeys.table_name(), "admin_api_keys");
    }

    #[tokio::test]
    async fn test_subscription_recv() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sub = Subscription::new(rx);
        tx.send(ChangeEvent {
            kind: ChangeKind::Insert,
            row: serde_json::json!({"id": "x"}),
        })
        .unwrap();
        let event = sub.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        drop(tx);
        assert!(sub.recv().await.is_none());
    }
}
