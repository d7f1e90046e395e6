//! Entity types shared across the stores, gateway, and migration paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A task row, optionally carrying its embedded subtasks and tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// At most one group; `None` means ungrouped.
    #[serde(default)]
    pub group_id: Option<Uuid>,
    /// 1-20 when set.
    #[serde(default)]
    pub speed_score: Option<u8>,
    /// 1-20 when set.
    #[serde(default)]
    pub importance_score: Option<u8>,
    #[serde(default)]
    pub emoji: Option<String>,
    /// Float-parseable ordering key; total-orders siblings in one list.
    pub order_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Embedded rows, populated by detail views and the guest dataset.
    /// Not part of the task row itself; realtime updates to core fields
    /// must preserve these.
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Task {
    /// Create a new task with defaulted fields.
    pub fn new(owner_id: Uuid, title: impl Into<String>, order_key: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            description: None,
            completed: false,
            completed_at: None,
            group_id: None,
            speed_score: None,
            importance_score: None,
            emoji: None,
            order_key,
            created_at: now,
            updated_at: now,
            subtasks: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Ordering key parsed as a float; unparseable keys sort first.
    pub fn order_value(&self) -> f64 {
        self.order_key.parse().unwrap_or(f64::NEG_INFINITY)
    }
}

/// A subtask, owned exclusively by its parent task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Dense 0-based position within the parent.
    pub position: u32,
}

impl Subtask {
    pub fn new(task_id: Uuid, title: impl Into<String>, position: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            title: title.into(),
            completed: false,
            completed_at: None,
            position,
        }
    }
}

/// A task group. Deleting a group must not delete its tasks; they become
/// ungrouped (enforced by the task store, not by cascade).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub emoji: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskGroup {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            emoji: None,
            created_at: Utc::now(),
        }
    }
}

/// Fixed tag color palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TagColor {
    #[default]
    Gray,
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
}

/// A tag. Deleting a tag removes its join rows, never its tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: TagColor,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(owner_id: Uuid, name: impl Into<String>, color: TagColor) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            color,
            created_at: Utc::now(),
        }
    }
}

/// Many-to-many join between tasks and tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTag {
    pub id: Uuid,
    pub task_id: Uuid,
    pub tag_id: Uuid,
}

impl TaskTag {
    pub fn new(task_id: Uuid, tag_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            tag_id,
        }
    }
}

/// Per-user settings row. `ai_api_key` holds ciphertext at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: Uuid,
    #[serde(default)]
    pub ai_api_key: Option<String>,
    /// Percentage, 0-100.
    pub speed_weight: u8,
    /// Percentage, 0-100.
    pub importance_weight: u8,
    #[serde(default)]
    pub auto_ranking: bool,
    #[serde(default)]
    pub auto_subtasks: bool,
    #[serde(default)]
    pub auto_tagging: bool,
    pub theme: String,
}

impl UserSettings {
    /// Defaults for a freshly created user.
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id,
            ai_api_key: None,
            speed_weight: 50,
            importance_weight: 50,
            auto_ranking: true,
            auto_subtasks: true,
            auto_tagging: false,
            theme: "aura".to_string(),
        }
    }
}

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// Per-user profile row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_guest: bool,
    pub nickname: String,
    #[serde(default)]
    pub nickname_set: bool,
}

impl UserProfile {
    /// Minimal profile created alongside an anonymous session.
    pub fn guest(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::User,
            is_guest: true,
            nickname: "Guest".to_string(),
            nickname_set: false,
        }
    }
}

/// An admin-owned API key in the shared fallback pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminApiKey {
    pub id: Uuid,
    pub key: String,
    pub is_active: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// An authenticated session, anonymous or permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub anonymous: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_roundtrip() {
        let task = Task::new(Uuid::new_v4(), "Write report", "1.0".to_string());
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, task.id);
        assert_eq!(back.title, "Write report");
        assert_eq!(back.order_key, "1.0");
        assert!(back.subtasks.is_empty());
    }

    #[test]
    fn test_task_row_without_embeds() {
        // Rows coming off the wire carry no subtasks/tags fields.
        let json = format!(
            r#"{{"id":"{}","owner_id":"{}","title":"t","order_key":"2.0",
               "created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let task: Task = serde_json::from_str(&json).unwrap();
        assert!(!task.completed);
        assert!(task.subtasks.is_empty());
        assert_eq!(task.order_value(), 2.0);
    }

    #[test]
    fn test_tag_color_serde() {
        let json = serde_json::to_string(&TagColor::Purple).unwrap();
        assert_eq!(json, r#""purple""#);
        let color: TagColor = serde_json::from_str(r#""green""#).unwrap();
        assert_eq!(color, TagColor::Green);
    }

    #[test]
    fn test_guest_profile() {
        let profile = UserProfile::guest(Uuid::new_v4());
        assert!(profile.is_guest);
        assert!(!profile.nickname_set);
        assert_eq!(profile.nickname, "Guest");
        assert_eq!(profile.role, Role::User);
    }
}
