//! # aura-gateway
//!
//! Implementations of the remote data gateway contract: an HTTP
//! (PostgREST-style) gateway for production and an in-memory gateway for
//! tests and offline use.

mod feed;
pub mod http;
pub mod memory;

pub use http::HttpGateway;
pub use memory::MemoryGateway;
