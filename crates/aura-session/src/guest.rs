//! The guest dataset.
//!
//! While a session is anonymous, task/group/tag mutations land here: local
//! collections with locally generated ids, persisted in durable storage.
//! Nothing is visible to the backend until migration re-creates the rows
//! under the permanent owner.

use aura_core::model::{Subtask, Tag, TagColor, Task, TaskGroup};
use aura_core::ordering;
use aura_core::traits::KeyValueStorage;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

const KEY_GUEST_ID: &str = "aura.guest.id";
const KEY_TASKS: &str = "aura.guest.tasks";
const KEY_GROUPS: &str = "aura.guest.groups";
const KEY_TAGS: &str = "aura.guest.tags";

pub struct GuestStore {
    storage: Arc<dyn KeyValueStorage>,
    guest_id: Uuid,
    tasks: Vec<Task>,
    groups: Vec<TaskGroup>,
    tags: Vec<Tag>,
    task_limit: usize,
}

fn load_collection<T: serde::de::DeserializeOwned>(
    storage: &dyn KeyValueStorage,
    key: &str,
) -> Vec<T> {
    let Some(raw) = storage.get(key) else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("guest: {key} is corrupt, starting empty: {e}");
        Vec::new()
    })
}

impl GuestStore {
    /// Open the guest dataset, creating a guest identity on first use.
    pub fn open(storage: Arc<dyn KeyValueStorage>, task_limit: usize) -> Self {
        let guest_id = storage
            .get(KEY_GUEST_ID)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(|| {
                let id = Uuid::new_v4();
                if let Err(e) = storage.set(KEY_GUEST_ID, &id.to_string()) {
                    warn!("guest: failed to persist guest id: {e}");
                }
                id
            });

        Self {
            tasks: load_collection(storage.as_ref(), KEY_TASKS),
            groups: load_collection(storage.as_ref(), KEY_GROUPS),
            tags: load_collection(storage.as_ref(), KEY_TAGS),
            storage,
            guest_id,
            task_limit,
        }
    }

    pub fn guest_id(&self) -> Uuid {
        self.guest_id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn groups(&self) -> &[TaskGroup] {
        &self.groups
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.groups.is_empty() && self.tags.is_empty()
    }

    /// Guests are capped; see the task store's `can_add`.
    pub fn can_add_task(&self) -> bool {
        self.tasks.len() < self.task_limit
    }

    fn persist<T: serde::Serialize>(&self, key: &str, value: &[T]) {
        match serde_json::to_string(value) {
            Ok(raw) => {
                if let Err(e) = self.storage.set(key, &raw) {
                    warn!("guest: failed to persist {key}: {e}");
                }
            }
            Err(e) => warn!("guest: failed to serialize {key}: {e}"),
        }
    }

    /// Create a task at the end of the list. `None` when the cap is hit.
    pub fn add_task(
        &mut self,
        title: impl Into<String>,
        description: Option<String>,
        group_id: Option<Uuid>,
    ) -> Option<Task> {
        if !self.can_add_task() {
            return None;
        }
        let order_key = ordering::generate_index(
            self.tasks.last().map(|t| t.order_key.as_str()),
            None,
        );
        let mut task = Task::new(self.guest_id, title, order_key);
        task.description = description;
        task.group_id = group_id;
        self.tasks.push(task.clone());
        self.persist(KEY_TASKS, &self.tasks);
        Some(task)
    }

    pub fn add_group(&mut self, name: impl Into<String>, emoji: Option<String>) -> TaskGroup {
        let mut group = TaskGroup::new(self.guest_id, name);
        group.emoji = emoji;
        self.groups.push(group.clone());
        self.persist(KEY_GROUPS, &self.groups);
        group
    }

    pub fn add_tag(&mut self, name: impl Into<String>, color: TagColor) -> Tag {
        let tag = Tag::new(self.guest_id, name, color);
        self.tags.push(tag.clone());
        self.persist(KEY_TAGS, &self.tags);
        tag
    }

    /// Append a subtask to a task, keeping positions dense.
    pub fn add_subtask(&mut self, task_id: Uuid, title: impl Into<String>) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            return false;
        };
        let position = task.subtasks.len() as u32;
        task.subtasks.push(Subtask::new(task_id, title, position));
        self.persist(KEY_TASKS, &self.tasks);
        true
    }

    /// Attach an existing tag to a task.
    pub fn link_tag(&mut self, task_id: Uuid, tag_id: Uuid) -> bool {
        let Some(tag) = self.tags.iter().find(|t| t.id == tag_id).cloned() else {
            return false;
        };
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            return false;
        };
        if !task.tags.iter().any(|t| t.id == tag_id) {
            task.tags.push(tag);
            self.persist(KEY_TASKS, &self.tasks);
        }
        true
    }

    pub fn set_task_completed(&mut self, task_id: Uuid, completed: bool) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            return false;
        };
        let now = Utc::now();
        task.completed = completed;
        task.completed_at = completed.then_some(now);
        task.updated_at = now;
        self.persist(KEY_TASKS, &self.tasks);
        true
    }

    pub fn remove_task(&mut self, task_id: Uuid) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != task_id);
        if self.tasks.len() == before {
            return false;
        }
        self.persist(KEY_TASKS, &self.tasks);
        true
    }

    /// Wipe the guest collections (after a successful migration).
    pub fn clear(&mut self) {
        self.tasks.clear();
        self.groups.clear();
        self.tags.clear();
        for key in [KEY_TASKS, KEY_GROUPS, KEY_TAGS] {
            if let Err(e) = self.storage.remove(key) {
                warn!("guest: failed to clear {key}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, GuestStore) {
        let storage = Arc::new(MemoryStorage::new());
        let guest = GuestStore::open(storage.clone(), 5);
        (storage, guest)
    }

    #[test]
    fn test_task_cap() {
        let (_, mut guest) = store();
        for i in 0..5 {
            assert!(guest.add_task(format!("t{i}"), None, None).is_some());
        }
        assert!(!guest.can_add_task());
        assert!(guest.add_task("over", None, None).is_none());
        assert_eq!(guest.tasks().len(), 5);
    }

    #[test]
    fn test_persists_across_reopen() {
        let storage = Arc::new(MemoryStorage::new());
        let mut guest = GuestStore::open(storage.clone(), 5);
        let group = guest.add_group("Work", Some("💼".to_string()));
        let task = guest.add_task("t", None, Some(group.id)).unwrap();
        guest.add_subtask(task.id, "step one");
        let id = guest.guest_id();

        let reopened = GuestStore::open(storage, 5);
        assert_eq!(reopened.guest_id(), id);
        assert_eq!(reopened.tasks().len(), 1);
        assert_eq!(reopened.tasks()[0].subtasks.len(), 1);
        assert_eq!(reopened.groups().len(), 1);
    }

    #[test]
    fn test_link_tag_dedupes() {
        let (_, mut guest) = store();
        let task = guest.add_task("t", None, None).unwrap();
        let tag = guest.add_tag("home", TagColor::Blue);
        assert!(guest.link_tag(task.id, tag.id));
        assert!(guest.link_tag(task.id, tag.id));
        assert_eq!(guest.tasks()[0].tags.len(), 1);
        assert!(!guest.link_tag(task.id, Uuid::new_v4()));
    }

    #[test]
    fn test_clear() {
        let (storage, mut guest) = store();
        guest.add_task("t", None, None);
        guest.add_tag("home", TagColor::Red);
        guest.clear();
        assert!(guest.is_empty());
        assert!(storage.get(KEY_TASKS).is_none());
    }
}
