//! # aura-ai
//!
//! AI-assisted task features: the Gemini text-generation provider, response
//! parsing helpers, and the key fallback policy that decides which API key
//! pays for a call — the user's own key first, then a shared admin pool —
//! and what default to return when none works.

pub mod gemini;
pub mod parse;
pub mod policy;

pub use gemini::GeminiGenerator;
pub use policy::{FallbackReason, KeyPolicy, PolicyResult, Source, TaskRanking};
