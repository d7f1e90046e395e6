//! Session lifecycle and guest-to-account migration.
//!
//! The controller owns two moments in a session's life: making sure a
//! usable session exists at startup (signing in anonymously when none
//! does), and moving the guest dataset under a permanent account after the
//! user links one.
//!
//! Linking spans a redirect through the auth provider, so the intent is
//! recorded durably first: `prepare_link` writes the anonymous user id as
//! a marker, and `on_signed_in` consumes it once the new session lands.
//! The marker is cleared on every exit path; a migration is attempted at
//! most once per link.

use crate::guest::GuestStore;
use aura_core::error::AuraError;
use aura_core::model::{Session, TaskTag, UserProfile};
use aura_core::traits::{Collection, Gateway, KeyValueStorage};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const KEY_MIGRATION_MARKER: &str = "aura.guest.migration_marker";

/// What `on_signed_in` did with the pending link.
#[derive(Debug)]
pub enum MigrationOutcome {
    /// The guest dataset now lives under the permanent account.
    Migrated {
        groups: usize,
        tags: usize,
        tasks: usize,
    },
    /// No marker, or nothing in the guest dataset worth moving.
    NothingToDo,
    /// The marker pointed at the session it was written under; the link
    /// never completed. Migrating would copy the data onto itself.
    SkippedStale,
    /// Migration failed partway; inserted rows were compensated and the
    /// guest dataset is untouched.
    Failed(AuraError),
}

pub struct SessionController {
    gateway: Arc<dyn Gateway>,
    storage: Arc<dyn KeyValueStorage>,
    signed_in_anonymously: bool,
}

impl SessionController {
    pub fn new(gateway: Arc<dyn Gateway>, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            gateway,
            storage,
            signed_in_anonymously: false,
        }
    }

    /// Return the current session, creating an anonymous one (with its
    /// guest profile row) when none exists. The anonymous sign-in happens
    /// at most once per controller; a second call with no session is an
    /// error rather than a second identity.
    pub async fn ensure_session(&mut self) -> Result<Session, AuraError> {
        if let Some(session) = self.gateway.session().await? {
            return Ok(session);
        }
        if self.signed_in_anonymously {
            return Err(AuraError::Unauthenticated);
        }

        let session = self.gateway.sign_in_anonymously().await?;
        self.signed_in_anonymously = true;
        info!("signed in anonymously as {}", session.user_id);

        let profile = UserProfile::guest(session.user_id);
        if let Err(e) = self
            .gateway
            .insert(Collection::Profiles, serde_json::to_value(&profile)?)
            .await
        {
            // The profile may already exist from an earlier run.
            warn!("guest profile insert failed: {e}");
        }
        Ok(session)
    }

    /// Record the intent to link the current anonymous session to a
    /// permanent account. Must be called before handing off to the auth
    /// provider; the marker survives the redirect.
    pub async fn prepare_link(&self) -> Result<(), AuraError> {
        let session = self
            .gateway
            .session()
            .await?
            .ok_or(AuraError::Unauthenticated)?;
        if !session.anonymous {
            return Err(AuraError::Migration(
                "session is already linked to an account".to_string(),
            ));
        }
        self.storage
            .set(KEY_MIGRATION_MARKER, &session.user_id.to_string())
    }

    /// Consume a pending link marker after sign-in, migrating the guest
    /// dataset to the new account. Errors surface in the outcome rather
    /// than propagating; the marker is cleared on every path.
    pub async fn on_signed_in(&self, guest: &mut GuestStore) -> MigrationOutcome {
        let Some(marker_id) = self
            .storage
            .get(KEY_MIGRATION_MARKER)
            .and_then(|raw| raw.parse::<Uuid>().ok())
        else {
            return MigrationOutcome::NothingToDo;
        };

        let session = match self.gateway.session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.clear_marker();
                return MigrationOutcome::Failed(AuraError::Unauthenticated);
            }
            Err(e) => {
                self.clear_marker();
                return MigrationOutcome::Failed(e);
            }
        };

        // The marker names the session it was written under. Seeing that
        // same identity again means the link never completed.
        if session.anonymous || session.user_id == marker_id {
            self.clear_marker();
            return MigrationOutcome::SkippedStale;
        }

        if guest.is_empty() {
            self.clear_marker();
            return MigrationOutcome::NothingToDo;
        }

        let mut inserted = Vec::new();
        let outcome = match self.copy_dataset(session.user_id, guest, &mut inserted).await {
            Ok(outcome) => {
                guest.clear();
                info!("migrated guest dataset to {}", session.user_id);
                outcome
            }
            Err(e) => {
                warn!("migration failed, compensating {} rows: {e}", inserted.len());
                self.compensate(inserted).await;
                MigrationOutcome::Failed(e)
            }
        };
        self.clear_marker();
        outcome
    }

    /// Insert the guest dataset under `owner`, recording every insert so a
    /// failure can be unwound. Insertion order respects references: groups
    /// and tags first, then tasks, then their subtasks and tag joins.
    async fn copy_dataset(
        &self,
        owner: Uuid,
        guest: &GuestStore,
        inserted: &mut Vec<(Collection, Uuid)>,
    ) -> Result<MigrationOutcome, AuraError> {
        let mut group_ids: HashMap<Uuid, Uuid> = HashMap::new();
        for group in guest.groups() {
            let mut row = group.clone();
            row.id = Uuid::new_v4();
            row.owner_id = owner;
            self.insert_row(Collection::Groups, serde_json::to_value(&row)?, row.id, inserted)
                .await?;
            group_ids.insert(group.id, row.id);
        }

        let mut tag_ids: HashMap<Uuid, Uuid> = HashMap::new();
        for tag in guest.tags() {
            let mut row = tag.clone();
            row.id = Uuid::new_v4();
            row.owner_id = owner;
            self.insert_row(Collection::Tags, serde_json::to_value(&row)?, row.id, inserted)
                .await?;
            tag_ids.insert(tag.id, row.id);
        }

        let mut task_ids: HashMap<Uuid, Uuid> = HashMap::new();
        for task in guest.tasks() {
            let mut row = task.clone();
            row.id = Uuid::new_v4();
            row.owner_id = owner;
            row.group_id = task.group_id.and_then(|old| {
                let new = group_ids.get(&old).copied();
                if new.is_none() {
                    warn!("task {} references unknown group {old}, ungrouping", task.id);
                }
                new
            });
            // Subtasks and tag joins travel as their own rows.
            let mut value = serde_json::to_value(&row)?;
            if let Some(fields) = value.as_object_mut() {
                fields.remove("subtasks");
                fields.remove("tags");
            }
            self.insert_row(Collection::Tasks, value, row.id, inserted).await?;
            task_ids.insert(task.id, row.id);
        }

        for task in guest.tasks() {
            let new_task_id = task_ids[&task.id];
            for subtask in &task.subtasks {
                let mut row = subtask.clone();
                row.id = Uuid::new_v4();
                row.task_id = new_task_id;
                self.insert_row(
                    Collection::Subtasks,
                    serde_json::to_value(&row)?,
                    row.id,
                    inserted,
                )
                .await?;
            }
            for tag in &task.tags {
                let Some(&new_tag_id) = tag_ids.get(&tag.id) else {
                    warn!("task {} references unknown tag {}, skipping", task.id, tag.id);
                    continue;
                };
                let join = TaskTag::new(new_task_id, new_tag_id);
                self.insert_row(
                    Collection::TaskTags,
                    serde_json::to_value(&join)?,
                    join.id,
                    inserted,
                )
                .await?;
            }
        }

        Ok(MigrationOutcome::Migrated {
            groups: group_ids.len(),
            tags: tag_ids.len(),
            tasks: task_ids.len(),
        })
    }

    async fn insert_row(
        &self,
        collection: Collection,
        row: Value,
        id: Uuid,
        inserted: &mut Vec<(Collection, Uuid)>,
    ) -> Result<(), AuraError> {
        self.gateway.insert(collection, row).await?;
        inserted.push((collection, id));
        Ok(())
    }

    /// Best-effort deletion of already-inserted rows, newest first so
    /// referencing rows go before the rows they reference.
    async fn compensate(&self, inserted: Vec<(Collection, Uuid)>) {
        for (collection, id) in inserted.into_iter().rev() {
            if let Err(e) = self.gateway.delete(collection, id).await {
                warn!("compensation delete of {} {id} failed: {e}", collection.table_name());
            }
        }
    }

    fn clear_marker(&self) {
        if let Err(e) = self.storage.remove(KEY_MIGRATION_MARKER) {
            warn!("failed to clear migration marker: {e}");
        }
    }
}
