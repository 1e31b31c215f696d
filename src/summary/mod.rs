//! Persona summary cache
//!
//! Fingerprints each persona card, generates a narrative summary once per
//! distinct definition, persists it, and serializes regeneration across
//! processes with a marker-file lock.

pub mod fingerprint;
pub mod generator;
pub mod lock;
pub mod orchestrator;
pub mod store;

pub use fingerprint::fingerprint;
pub use generator::{LlmSummaryGenerator, SummaryGenerator};
pub use lock::{FileLock, RegenerationLock, LOCK_FILE_NAME};
pub use orchestrator::{CacheStatus, EnsureReport, SummaryOptions, SummaryService};
pub use store::{SummaryEntry, SummaryStore};
