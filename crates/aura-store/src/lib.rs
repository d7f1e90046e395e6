//! # aura-store
//!
//! In-memory entity stores over the remote data gateway. Each store applies
//! mutations optimistically, issues exactly one remote call per action, and
//! rolls back the affected rows on failure. The reconciler merges realtime
//! change events back into the collections.
//!
//! Split into focused submodules:
//! - `tasks` — task store (ordering, completion, guest cap)
//! - `groups` / `tags` / `settings` — the remaining entity stores
//! - `filter` — pure derived task views
//! - `reconcile` — change-event merging and the per-row version gate
//! - `context` — the application context owning the stores

pub mod context;
pub mod filter;
pub mod groups;
pub mod reconcile;
pub mod settings;
pub mod tags;
pub mod tasks;

pub use context::AppContext;
pub use filter::{ActiveTab, PriorityFilter, StatusFilter, TaskFilter};
pub use groups::GroupStore;
pub use settings::SettingsStore;
pub use tags::TagStore;
pub use tasks::TaskStore;
