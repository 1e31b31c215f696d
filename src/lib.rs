//! Persona Coordinator
//!
//! Loads persona cards from a directory, keeps a cached identity summary for
//! each one, and serves greeting and chat endpoints backed by a local
//! OpenAI-compatible language-model runtime. Summary regeneration is
//! serialized across every process sharing the cache directory.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod persona;
pub mod server;
pub mod summary;
pub mod version;

pub use context::AppContext;
pub use error::{Error, ErrorCode, Result};
