//! # aura-session
//!
//! Guest session handling: durable local storage, the guest dataset, and
//! the controller that migrates a guest's data into a permanent account.

pub mod controller;
pub mod guest;
pub mod storage;

pub use controller::{MigrationOutcome, SessionController};
pub use guest::GuestStore;
pub use storage::{FileStorage, MemoryStorage};
