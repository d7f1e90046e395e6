//! # aura-core
//!
//! Core types, traits, configuration, and error handling for the AuraTask
//! synchronization core.

pub mod config;
pub mod crypto;
pub mod error;
pub mod model;
pub mod ordering;
pub mod traits;

pub use config::shellexpand;
pub use error::AuraError;
