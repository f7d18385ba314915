//! Server-side orchestration for a bitforest instance: configuration, the
//! header cache, the background anchor and header-sync loops, the
//! generators for the artifacts served to clients, and the HTTP layer that
//! binds those generators to a listening socket.

pub mod anchor_loop;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod header_cache;
pub mod header_sync_loop;
pub mod http;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use header_cache::HeaderCache;
pub use http::{router, serve, AppState};
