//! Summary cache store
//!
//! One JSON file per persona key under the cache directory. Writes go to a
//! temporary file in the same directory and are renamed into place, so a
//! reader sees either the previous entry or the new one.

use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const ENTRY_EXTENSION: &str = "json";

/// One persisted summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEntry {
    pub key: String,

    /// Persona fingerprint the summary was generated from
    pub hash: String,

    pub updated_at: DateTime<Utc>,

    pub summary: String,
}

impl SummaryEntry {
    /// Fresh iff generated from exactly this fingerprint
    pub fn is_fresh_for(&self, fingerprint: &str) -> bool {
        self.hash == fingerprint
    }
}

// ─────────────────────────────────────────────────────────────────
// Summary Store
// ─────────────────────────────────────────────────────────────────

pub struct SummaryStore {
    dir: PathBuf,
}

impl SummaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", file_stem_for(key), ENTRY_EXTENSION))
    }

    /// Load the entry for `key`; absent or unreadable entries are a miss
    pub fn load(&self, key: &str) -> Option<SummaryEntry> {
        match self.read_entry(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(persona = %key, error = %e.format_for_log(), "Ignoring summary cache entry");
                None
            }
        }
    }

    /// Like [`load`](Self::load) but reports why an existing file was rejected
    pub fn read_entry(&self, key: &str) -> Result<Option<SummaryEntry>> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::IoRead { path, source: e }),
        };

        let corrupt = |reason: String| Error::CorruptCacheEntry {
            path: path.clone(),
            reason,
        };

        let entry: SummaryEntry = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        if entry.key != key {
            return Err(corrupt(format!("entry belongs to '{}'", entry.key)));
        }
        if entry.summary.trim().is_empty() {
            return Err(corrupt("summary is empty".to_string()));
        }

        Ok(Some(entry))
    }

    /// Atomically write a new entry for `key`
    pub fn save(&self, key: &str, hash: &str, summary: &str) -> Result<SummaryEntry> {
        let entry = SummaryEntry {
            key: key.to_string(),
            hash: hash.to_string(),
            updated_at: Utc::now(),
            summary: summary.to_string(),
        };

        fs::create_dir_all(&self.dir).map_err(|e| Error::IoWrite {
            path: self.dir.clone(),
            source: e,
        })?;

        let path = self.path_for(key);
        let write_err = |e: std::io::Error| Error::IoWrite {
            path: path.clone(),
            source: e,
        };

        let body = serde_json::to_vec_pretty(&entry)?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        debug!(persona = %key, path = %path.display(), "Summary cache entry written");
        Ok(entry)
    }

    /// Delete entries whose key is not in `live_keys`, returning how many
    ///
    /// Only `*.json` files are considered, so the lock marker and in-flight
    /// temporary files are never touched.
    pub fn sweep_orphans(&self, live_keys: &HashSet<String>) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(Error::IoRead {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let live_stems: HashSet<String> = live_keys.iter().map(|k| file_stem_for(k)).collect();
        let mut removed = 0;

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if live_stems.contains(stem) {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "Removed orphaned summary");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove orphaned summary"),
            }
        }

        Ok(removed)
    }
}

/// File-system safe stem for a persona key
///
/// Bytes outside `[A-Za-z0-9_-]` are percent-encoded, so two keys never
/// share a file.
fn file_stem_for(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
