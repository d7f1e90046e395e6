//! Task store: optimistic CRUD, fractional reordering, completion, and the
//! guest task cap.

use aura_core::error::AuraError;
use aura_core::model::{Subtask, Tag, Task, TaskTag};
use aura_core::ordering;
use aura_core::traits::{Collection, Gateway};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::reconcile::VersionGate;

/// Input for a new task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub group_id: Option<Uuid>,
}

/// Partial update. Outer `None` leaves a field untouched; inner `None`
/// clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub group_id: Option<Option<Uuid>>,
    pub emoji: Option<Option<String>>,
    pub speed_score: Option<u8>,
    pub importance_score: Option<u8>,
}

impl TaskPatch {
    fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(group_id) = &self.group_id {
            task.group_id = *group_id;
        }
        if let Some(emoji) = &self.emoji {
            task.emoji = emoji.clone();
        }
        if let Some(speed) = self.speed_score {
            task.speed_score = Some(speed);
        }
        if let Some(importance) = self.importance_score {
            task.importance_score = Some(importance);
        }
        task.updated_at = Utc::now();
    }

    fn to_row(&self, task: &Task) -> Value {
        let mut patch = serde_json::Map::new();
        if self.title.is_some() {
            patch.insert("title".into(), json!(task.title));
        }
        if self.description.is_some() {
            patch.insert("description".into(), json!(task.description));
        }
        if self.group_id.is_some() {
            patch.insert("group_id".into(), json!(task.group_id));
        }
        if self.emoji.is_some() {
            patch.insert("emoji".into(), json!(task.emoji));
        }
        if self.speed_score.is_some() {
            patch.insert("speed_score".into(), json!(task.speed_score));
        }
        if self.importance_score.is_some() {
            patch.insert("importance_score".into(), json!(task.importance_score));
        }
        patch.insert("updated_at".into(), json!(task.updated_at));
        Value::Object(patch)
    }
}

/// The task row as the remote table stores it (no embedded collections).
fn task_row(task: &Task) -> Value {
    let mut row = serde_json::to_value(task).expect("task serializes");
    if let Some(fields) = row.as_object_mut() {
        fields.remove("subtasks");
        fields.remove("tags");
    }
    row
}

pub struct TaskStore {
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) items: Vec<Task>,
    pub(crate) loading: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) gate: VersionGate,
}

impl TaskStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            items: Vec::new(),
            loading: false,
            last_error: None,
            gate: VersionGate::default(),
        }
    }

    /// Tasks in display order (ascending ordering key).
    pub fn tasks(&self) -> &[Task] {
        &self.items
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    /// Human-readable message from the last failed action, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn sort(&mut self) {
        self.items.sort_by(|a, b| {
            a.order_value()
                .partial_cmp(&b.order_value())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
    }

    fn record_error(&mut self, context: &str, err: &AuraError) {
        warn!("tasks: {context}: {err}");
        self.last_error = Some(format!("{context}: {err}"));
    }

    fn unauthenticated(&mut self, context: &str) {
        self.record_error(context, &AuraError::Unauthenticated);
    }

    /// Load the owner's tasks with embedded subtasks and tags.
    pub async fn load(&mut self, owner: Option<Uuid>) -> bool {
        let Some(owner) = owner else {
            self.unauthenticated("load tasks");
            return false;
        };
        self.loading = true;
        let result = self.fetch_all(owner).await;
        self.loading = false;
        match result {
            Ok(tasks) => {
                self.items = tasks;
                self.sort();
                self.last_error = None;
                true
            }
            Err(e) => {
                self.record_error("load tasks", &e);
                false
            }
        }
    }

    async fn fetch_all(&self, owner: Uuid) -> Result<Vec<Task>, AuraError> {
        let rows = self.gateway.select(Collection::Tasks, owner).await?;
        let mut tasks: Vec<Task> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!("tasks: skipping malformed row: {e}");
                    None
                }
            })
            .collect();

        let subtasks: Vec<Subtask> = decode_rows(
            self.gateway.select(Collection::Subtasks, owner).await?,
            "subtask",
        );
        let tags: Vec<Tag> = decode_rows(self.gateway.select(Collection::Tags, owner).await?, "tag");
        let links: Vec<TaskTag> = decode_rows(
            self.gateway.select(Collection::TaskTags, owner).await?,
            "task_tag",
        );

        for task in &mut tasks {
            task.subtasks = subtasks
                .iter()
                .filter(|s| s.task_id == task.id)
                .cloned()
                .collect();
            task.subtasks.sort_by_key(|s| s.position);
            task.tags = links
                .iter()
                .filter(|l| l.task_id == task.id)
                .filter_map(|l| tags.iter().find(|t| t.id == l.tag_id).cloned())
                .collect();
        }
        Ok(tasks)
    }

    /// Whether another task may be added. Pure predicate: guests are capped.
    pub fn can_add(&self, is_guest: bool, guest_limit: usize) -> bool {
        !(is_guest && self.items.len() >= guest_limit)
    }

    /// Create a task at the end of the list.
    pub async fn add(&mut self, owner: Option<Uuid>, new: NewTask) -> Option<Task> {
        let Some(owner) = owner else {
            self.unauthenticated("add task");
            return None;
        };

        let order_key = ordering::generate_index(
            self.items.last().map(|t| t.order_key.as_str()),
            None,
        );
        let mut task = Task::new(owner, new.title, order_key);
        task.description = new.description;
        task.group_id = new.group_id;

        let version = self.gate.begin(task.id);
        self.items.push(task.clone());
        self.sort();

        match self.gateway.insert(Collection::Tasks, task_row(&task)).await {
            Ok(_) => {
                self.gate.settle(task.id, version);
                self.last_error = None;
                Some(task)
            }
            Err(e) => {
                self.items.retain(|t| t.id != task.id);
                self.gate.settle(task.id, version);
                self.record_error("add task", &e);
                None
            }
        }
    }

    /// Patch a task's fields.
    pub async fn update(
        &mut self,
        owner: Option<Uuid>,
        id: Uuid,
        patch: TaskPatch,
    ) -> Option<Task> {
        let Some(owner) = owner else {
            self.unauthenticated("update task");
            return None;
        };
        let Some(index) = self.items.iter().position(|t| t.id == id && t.owner_id == owner)
        else {
            self.unauthenticated("update task");
            return None;
        };

        let snapshot = self.items[index].clone();
        let version = self.gate.begin(id);
        patch.apply_to(&mut self.items[index]);
        let row_patch = patch.to_row(&self.items[index]);
        self.sort();

        match self.gateway.update(Collection::Tasks, id, row_patch).await {
            Ok(_) => {
                self.gate.settle(id, version);
                self.last_error = None;
                self.items.iter().find(|t| t.id == id).cloned()
            }
            Err(e) => {
                if let Some(task) = self.items.iter_mut().find(|t| t.id == id) {
                    *task = snapshot;
                }
                self.sort();
                self.gate.settle(id, version);
                self.record_error("update task", &e);
                None
            }
        }
    }

    /// Set the completion flag, stamping or clearing the timestamp.
    pub async fn set_completed(&mut self, owner: Option<Uuid>, id: Uuid, completed: bool) -> bool {
        let Some(owner) = owner else {
            self.unauthenticated("complete task");
            return false;
        };
        let Some(index) = self.items.iter().position(|t| t.id == id && t.owner_id == owner)
        else {
            self.unauthenticated("complete task");
            return false;
        };

        let snapshot = self.items[index].clone();
        let version = self.gate.begin(id);
        let now = Utc::now();
        {
            let task = &mut self.items[index];
            task.completed = completed;
            task.completed_at = completed.then_some(now);
            task.updated_at = now;
        }
        let patch = json!({
            "completed": completed,
            "completed_at": completed.then_some(now),
            "updated_at": now,
        });

        match self.gateway.update(Collection::Tasks, id, patch).await {
            Ok(_) => {
                self.gate.settle(id, version);
                self.last_error = None;
                true
            }
            Err(e) => {
                if let Some(task) = self.items.iter_mut().find(|t| t.id == id) {
                    *task = snapshot;
                }
                self.gate.settle(id, version);
                self.record_error("complete task", &e);
                false
            }
        }
    }

    /// Delete a task. A remote `NotFound` keeps the local removal (the row
    /// is already gone) but records the distinguishable message.
    pub async fn remove(&mut self, owner: Option<Uuid>, id: Uuid) -> bool {
        let Some(owner) = owner else {
            self.unauthenticated("remove task");
            return false;
        };
        let Some(index) = self.items.iter().position(|t| t.id == id && t.owner_id == owner)
        else {
            self.unauthenticated("remove task");
            return false;
        };

        let snapshot = self.items.remove(index);
        match self.gateway.delete(Collection::Tasks, id).await {
            Ok(()) => {
                self.gate.forget(id);
                self.last_error = None;
                true
            }
            Err(e) if e.is_not_found() => {
                self.gate.forget(id);
                self.record_error("remove task", &e);
                true
            }
            Err(e) => {
                self.items.insert(index.min(self.items.len()), snapshot);
                self.sort();
                self.record_error("remove task", &e);
                false
            }
        }
    }

    /// Move `active` adjacent to `over`, persisting only the moved row's
    /// ordering key. On remote failure the store reloads from the gateway
    /// rather than risk permanent order drift.
    pub async fn reorder(&mut self, owner: Option<Uuid>, active: Uuid, over: Uuid) -> bool {
        let Some(owner) = owner else {
            self.unauthenticated("reorder task");
            return false;
        };
        let (Some(from), Some(to)) = (
            self.items.iter().position(|t| t.id == active),
            self.items.iter().position(|t| t.id == over),
        ) else {
            return false;
        };
        if from == to {
            return true;
        }

        // Moving down lands after `over`; moving up lands before it.
        let (prev, next) = if from < to {
            (Some(to), self.items.get(to + 1).map(|_| to + 1))
        } else {
            (to.checked_sub(1), Some(to))
        };
        let prev_key = prev.map(|i| self.items[i].order_key.clone());
        let next_key = next.map(|i| self.items[i].order_key.clone());

        if let (Some(p), Some(n)) = (&prev_key, &next_key) {
            if ordering::is_exhausted(p, n) && !self.renormalize(owner).await {
                return false;
            }
        }

        // Keys may have changed during renormalization; re-read them.
        let prev_key = prev.map(|i| self.items[i].order_key.clone());
        let next_key = next.map(|i| self.items[i].order_key.clone());
        let new_key = ordering::generate_index(prev_key.as_deref(), next_key.as_deref());

        let version = self.gate.begin(active);
        if let Some(task) = self.items.iter_mut().find(|t| t.id == active) {
            task.order_key = new_key.clone();
            task.updated_at = Utc::now();
        }
        self.sort();

        let patch = json!({ "order_key": new_key, "updated_at": Utc::now() });
        match self.gateway.update(Collection::Tasks, active, patch).await {
            Ok(_) => {
                self.gate.settle(active, version);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.gate.settle(active, version);
                self.record_error("reorder task", &e);
                self.load(Some(owner)).await;
                false
            }
        }
    }

    /// Reassign integer-spaced ordering keys to the whole list and persist
    /// them. Run when float precision between two neighbors is exhausted.
    async fn renormalize(&mut self, owner: Uuid) -> bool {
        warn!("tasks: ordering keys exhausted, renormalizing {} rows", self.items.len());
        let keys = ordering::renormalized_keys(self.items.len());
        for (task, key) in self.items.iter_mut().zip(&keys) {
            task.order_key = key.clone();
        }
        for (id, key) in self
            .items
            .iter()
            .map(|t| (t.id, t.order_key.clone()))
            .collect::<Vec<_>>()
        {
            let patch = json!({ "order_key": key });
            if let Err(e) = self.gateway.update(Collection::Tasks, id, patch).await {
                self.record_error("renormalize ordering", &e);
                self.load(Some(owner)).await;
                return false;
            }
        }
        true
    }

    /// Detach every task in `group_id` (group deletion must not delete its
    /// tasks). Best effort per row.
    pub async fn clear_group(&mut self, owner: Option<Uuid>, group_id: Uuid) -> bool {
        let Some(owner) = owner else {
            self.unauthenticated("clear group");
            return false;
        };
        let affected: Vec<Uuid> = self
            .items
            .iter()
            .filter(|t| t.owner_id == owner && t.group_id == Some(group_id))
            .map(|t| t.id)
            .collect();

        let mut ok = true;
        for id in affected {
            let patch = TaskPatch {
                group_id: Some(None),
                ..Default::default()
            };
            if self.update(Some(owner), id, patch).await.is_none() {
                ok = false;
            }
        }
        ok
    }

    /// Drop a deleted tag from the embedded tag lists. Local only; the
    /// backend cascades the join rows.
    pub fn strip_tag(&mut self, tag_id: Uuid) {
        for task in &mut self.items {
            task.tags.retain(|t| t.id != tag_id);
        }
    }
}

fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>, entity: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("tasks: skipping malformed {entity} row: {e}");
                None
            }
        })
        .collect()
}
