//! Pure derived views over the task collection.
//!
//! `filter_tasks` is a side-effect-free projection: it never mutates the
//! source slice and is safe to recompute on every filter change.

use aura_core::model::Task;
use chrono::NaiveDate;
use uuid::Uuid;

/// Completion status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

/// Priority bucket, computed from the importance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityFilter {
    #[default]
    All,
    /// importance >= 15
    High,
    /// importance 8-14
    Medium,
    /// importance < 8
    Low,
}

/// The active view tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveTab {
    #[default]
    All,
    /// Created today.
    Today,
    /// importance >= 15
    Important,
    Completed,
}

/// Current filter state.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Free-text query against title + description.
    pub query: String,
    pub group_id: Option<Uuid>,
    pub status: StatusFilter,
    pub priority: PriorityFilter,
    pub tag_id: Option<Uuid>,
    pub tab: ActiveTab,
}

fn priority_bucket(task: &Task) -> PriorityFilter {
    match task.importance_score.unwrap_or(0) {
        15.. => PriorityFilter::High,
        8..=14 => PriorityFilter::Medium,
        _ => PriorityFilter::Low,
    }
}

fn matches(task: &Task, filter: &TaskFilter, today: NaiveDate) -> bool {
    if !filter.query.is_empty() {
        let needle = filter.query.to_lowercase();
        let in_title = task.title.to_lowercase().contains(&needle);
        let in_description = task
            .description
            .as_deref()
            .map(|d| d.to_lowercase().contains(&needle))
            .unwrap_or(false);
        if !in_title && !in_description {
            return false;
        }
    }

    if let Some(group_id) = filter.group_id {
        if task.group_id != Some(group_id) {
            return false;
        }
    }

    match filter.status {
        StatusFilter::All => {}
        StatusFilter::Active => {
            if task.completed {
                return false;
            }
        }
        StatusFilter::Completed => {
            if !task.completed {
                return false;
            }
        }
    }

    if filter.priority != PriorityFilter::All && priority_bucket(task) != filter.priority {
        return false;
    }

    if let Some(tag_id) = filter.tag_id {
        if !task.tags.iter().any(|t| t.id == tag_id) {
            return false;
        }
    }

    match filter.tab {
        ActiveTab::All => true,
        ActiveTab::Today => task.created_at.date_naive() == today,
        ActiveTab::Important => task.importance_score.unwrap_or(0) >= 15,
        ActiveTab::Completed => task.completed,
    }
}

/// Apply `filter` to `tasks`, preserving their order.
pub fn filter_tasks(tasks: &[Task], filter: &TaskFilter, today: NaiveDate) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| matches(task, filter, today))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_core::model::{Tag, TagColor};
    use chrono::Utc;

    fn task(title: &str) -> Task {
        Task::new(Uuid::new_v4(), title, "1.0".to_string())
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn test_query_matches_title_and_description() {
        let mut a = task("Buy groceries");
        a.description = Some("milk and bread".to_string());
        let b = task("Write report");

        let filter = TaskFilter {
            query: "MILK".to_string(),
            ..Default::default()
        };
        let out = filter_tasks(&[a.clone(), b], &filter, today());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, a.id);
    }

    #[test]
    fn test_status_filter() {
        let mut done = task("done");
        done.completed = true;
        let open = task("open");
        let tasks = [done, open];

        let active = TaskFilter {
            status: StatusFilter::Active,
            ..Default::default()
        };
        assert_eq!(filter_tasks(&tasks, &active, today())[0].title, "open");

        let completed = TaskFilter {
            status: StatusFilter::Completed,
            ..Default::default()
        };
        assert_eq!(filter_tasks(&tasks, &completed, today())[0].title, "done");
    }

    #[test]
    fn test_priority_buckets() {
        let mut high = task("high");
        high.importance_score = Some(15);
        let mut medium = task("medium");
        medium.importance_score = Some(8);
        let mut low = task("low");
        low.importance_score = Some(7);
        let unscored = task("unscored");
        let tasks = [high, medium, low, unscored];

        for (priority, expected) in [
            (PriorityFilter::High, vec!["high"]),
            (PriorityFilter::Medium, vec!["medium"]),
            (PriorityFilter::Low, vec!["low", "unscored"]),
        ] {
            let filter = TaskFilter {
                priority,
                ..Default::default()
            };
            let titles: Vec<_> = filter_tasks(&tasks, &filter, today())
                .into_iter()
                .map(|t| t.title)
                .collect();
            assert_eq!(titles, expected);
        }
    }

    #[test]
    fn test_tag_filter() {
        let tag = Tag::new(Uuid::new_v4(), "home", TagColor::Green);
        let mut tagged = task("tagged");
        tagged.tags.push(tag.clone());
        let plain = task("plain");

        let filter = TaskFilter {
            tag_id: Some(tag.id),
            ..Default::default()
        };
        let out = filter_tasks(&[tagged, plain], &filter, today());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "tagged");
    }

    #[test]
    fn test_today_tab() {
        let fresh = task("fresh");
        let mut old = task("old");
        old.created_at = old.created_at - chrono::Duration::days(2);

        let filter = TaskFilter {
            tab: ActiveTab::Today,
            ..Default::default()
        };
        let out = filter_tasks(&[fresh, old], &filter, today());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "fresh");
    }

    #[test]
    fn test_pure_and_idempotent() {
        let tasks = vec![task("a"), task("b")];
        let before = serde_json::to_string(&tasks).unwrap();
        let filter = TaskFilter {
            query: "a".to_string(),
            ..Default::default()
        };

        let first = filter_tasks(&tasks, &filter, today());
        let second = filter_tasks(&tasks, &filter, today());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        // Source unchanged.
        assert_eq!(serde_json::to_string(&tasks).unwrap(), before);
    }
}
