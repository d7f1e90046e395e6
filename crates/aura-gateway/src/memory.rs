//! In-memory gateway.
//!
//! Backs the test suites and the offline CLI. Implements the full gateway
//! contract against process-local tables, echoing every committed mutation
//! into the change-feed registry, and supports failure injection so store
//! rollback paths can be exercised.

use crate::feed::FeedRegistry;
use async_trait::async_trait;
use aura_core::error::AuraError;
use aura_core::model::Session;
use aura_core::traits::{ChangeEvent, ChangeKind, Collection, Gateway, Subscription};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryGateway {
    tables: Mutex<HashMap<Collection, Vec<Value>>>,
    session: Mutex<Option<Session>>,
    fail_plan: Mutex<Option<(usize, String)>>,
    feeds: FeedRegistry,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next CRUD call fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.fail_after(0, message);
    }

    /// Let `calls` CRUD calls through, then fail the one after with
    /// `message`. Exercises partial-failure paths in multi-row sequences.
    pub fn fail_after(&self, calls: usize, message: impl Into<String>) {
        *self.fail_plan.lock().expect("lock poisoned") = Some((calls, message.into()));
    }

    /// Install a session directly (tests bypass the auth flow).
    pub fn set_session(&self, session: Option<Session>) {
        *self.session.lock().expect("lock poisoned") = session;
    }

    /// Pre-populate a table.
    pub fn seed(&self, collection: Collection, rows: Vec<Value>) {
        self.tables
            .lock()
            .expect("lock poisoned")
            .entry(collection)
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        self.tables
            .lock()
            .expect("lock poisoned")
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    fn take_failure(&self) -> Result<(), AuraError> {
        let mut plan = self.fail_plan.lock().expect("lock poisoned");
        match plan.take() {
            Some((0, message)) => Err(AuraError::Gateway(message)),
            Some((calls, message)) => {
                *plan = Some((calls - 1, message));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn publish(&self, collection: Collection, row: &Value, kind: ChangeKind) {
        if let Some(owner) = row_owner(row) {
            self.feeds.publish(
                collection,
                owner,
                ChangeEvent {
                    kind,
                    row: row.clone(),
                },
            );
        }
    }
}

/// Owner of a row: `owner_id` for entity rows, `user_id` for per-user rows.
fn row_owner(row: &Value) -> Option<Uuid> {
    row.get("owner_id")
        .or_else(|| row.get("user_id"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

/// Whether `row` is addressed by `id` (`id` column, or `user_id` for
/// singleton per-user rows).
fn matches_id(row: &Value, id: Uuid) -> bool {
    let wanted = id.to_string();
    row.get("id").and_then(Value::as_str) == Some(wanted.as_str())
        || row.get("user_id").and_then(Value::as_str) == Some(wanted.as_str())
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn select(&self, collection: Collection, owner: Uuid) -> Result<Vec<Value>, AuraError> {
        self.take_failure()?;
        let tables = self.tables.lock().expect("lock poisoned");
        let rows = tables.get(&collection).cloned().unwrap_or_default();
        // Unowned collections (admin keys, join rows) are returned whole;
        // the real backend scopes them by its own policies.
        Ok(rows
            .into_iter()
            .filter(|row| row_owner(row).map(|o| o == owner).unwrap_or(true))
            .collect())
    }

    async fn insert(&self, collection: Collection, row: Value) -> Result<Value, AuraError> {
        self.take_failure()?;
        self.tables
            .lock()
            .expect("lock poisoned")
            .entry(collection)
            .or_default()
            .push(row.clone());
        self.publish(collection, &row, ChangeKind::Insert);
        Ok(row)
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Value,
    ) -> Result<Value, AuraError> {
        self.take_failure()?;
        let merged = {
            let mut tables = self.tables.lock().expect("lock poisoned");
            let rows = tables.entry(collection).or_default();
            let row = rows
                .iter_mut()
                .find(|row| matches_id(row, id))
                .ok_or_else(|| {
                    AuraError::NotFound(format!("{} {id}", collection.table_name()))
                })?;
            if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            row.clone()
        };
        self.publish(collection, &merged, ChangeKind::Update);
        Ok(merged)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), AuraError> {
        self.take_failure()?;
        let removed = {
            let mut tables = self.tables.lock().expect("lock poisoned");
            let rows = tables.entry(collection).or_default();
            let index = rows.iter().position(|row| matches_id(row, id));
            index.map(|i| rows.remove(i))
        };
        let row = removed
            .ok_or_else(|| AuraError::NotFound(format!("{} {id}", collection.table_name())))?;
        self.publish(collection, &row, ChangeKind::Delete);
        Ok(())
    }

    fn subscribe(&self, collection: Collection, owner: Uuid) -> Subscription {
        self.feeds.subscribe(collection, owner)
    }

    async fn session(&self) -> Result<Option<Session>, AuraError> {
        Ok(*self.session.lock().expect("lock poisoned"))
    }

    async fn sign_in_anonymously(&self) -> Result<Session, AuraError> {
        let session = Session {
            user_id: Uuid::new_v4(),
            anonymous: true,
        };
        *self.session.lock().expect("lock poisoned") = Some(session);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_select_scoped_by_owner() {
        let gateway = MemoryGateway::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        gateway
            .insert(Collection::Tasks, json!({"id": Uuid::new_v4(), "owner_id": owner}))
            .await
            .unwrap();
        gateway
            .insert(Collection::Tasks, json!({"id": Uuid::new_v4(), "owner_id": other}))
            .await
            .unwrap();

        assert_eq!(gateway.select(Collection::Tasks, owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_merges_and_missing_is_not_found() {
        let gateway = MemoryGateway::new();
        let id = Uuid::new_v4();
        gateway
            .insert(Collection::Tasks, json!({"id": id, "title": "a", "completed": false}))
            .await
            .unwrap();

        let merged = gateway
            .update(Collection::Tasks, id, json!({"completed": true}))
            .await
            .unwrap();
        assert_eq!(merged["title"], "a");
        assert_eq!(merged["completed"], true);

        let err = gateway
            .update(Collection::Tasks, Uuid::new_v4(), json!({}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_mutations_echo_into_feed() {
        let gateway = MemoryGateway::new();
        let owner = Uuid::new_v4();
        let mut sub = gateway.subscribe(Collection::Tasks, owner);
        let id = Uuid::new_v4();
        gateway
            .insert(Collection::Tasks, json!({"id": id, "owner_id": owner}))
            .await
            .unwrap();
        gateway.delete(Collection::Tasks, id).await.unwrap();

        assert_eq!(sub.try_recv().unwrap().kind, ChangeKind::Insert);
        assert_eq!(sub.try_recv().unwrap().kind, ChangeKind::Delete);
    }

    #[tokio::test]
    async fn test_fail_next() {
        let gateway = MemoryGateway::new();
        gateway.fail_next("boom");
        assert!(gateway
            .insert(Collection::Tasks, json!({"id": Uuid::new_v4()}))
            .await
            .is_err());
        // Only the next call fails.
        assert!(gateway
            .insert(Collection::Tasks, json!({"id": Uuid::new_v4()}))
            .await
            .is_ok());
    }
}
