//! Persona store
//!
//! Reads `*.json` cards from the persona directory once, keeps them in a
//! stable order, and resolves UI selectors to records. Rescanning is an
//! explicit call.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::types::PersonaRecord;

/// Ordered, shared persona listing
pub type PersonaList = Arc<Vec<Arc<PersonaRecord>>>;

/// What `resolve` returns when a non-empty selector matches nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorFallback {
    /// Serve the first persona so stale UI links keep working
    #[default]
    FirstPersona,
    /// Report no match
    NoMatch,
}

// ─────────────────────────────────────────────────────────────────
// Persona Store
// ─────────────────────────────────────────────────────────────────

pub struct PersonaStore {
    dir: PathBuf,
    fallback: SelectorFallback,
    listing: RwLock<Option<PersonaList>>,
}

impl PersonaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fallback: SelectorFallback::default(),
            listing: RwLock::new(None),
        }
    }

    pub fn with_fallback(mut self, fallback: SelectorFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All personas ordered by file name, loaded on first use
    pub fn list(&self) -> PersonaList {
        if let Some(listing) = self.listing.read().as_ref() {
            return Arc::clone(listing);
        }

        let mut slot = self.listing.write();
        // another thread may have loaded while we waited for the write lock
        if let Some(listing) = slot.as_ref() {
            return Arc::clone(listing);
        }
        let listing = Arc::new(load_dir(&self.dir));
        *slot = Some(Arc::clone(&listing));
        listing
    }

    /// Re-read the directory, replacing the cached listing
    pub fn rescan(&self) -> PersonaList {
        let listing = Arc::new(load_dir(&self.dir));
        *self.listing.write() = Some(Arc::clone(&listing));
        info!(dir = %self.dir.display(), count = listing.len(), "Persona directory rescanned");
        listing
    }

    pub fn is_empty(&self) -> bool {
        self.list().is_empty()
    }

    /// Exact key lookup
    pub fn find_by_key(&self, key: &str) -> Option<Arc<PersonaRecord>> {
        self.list().iter().find(|p| p.key == key).cloned()
    }

    /// Resolve a label, display name or key (case-insensitive)
    ///
    /// An absent or blank selector yields the first persona; an unknown one
    /// is handled by the store's [`SelectorFallback`].
    pub fn resolve(&self, selector: Option<&str>) -> Option<Arc<PersonaRecord>> {
        let listing = self.list();
        let first = listing.first().cloned();

        let selector = match selector.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => return first,
        };

        let exact = listing
            .iter()
            .find(|p| p.selector_names().any(|n| n == selector));
        let hit = exact.or_else(|| {
            let wanted = selector.to_lowercase();
            listing
                .iter()
                .find(|p| p.selector_names().any(|n| n.to_lowercase() == wanted))
        });

        match (hit, self.fallback) {
            (Some(p), _) => Some(Arc::clone(p)),
            (None, SelectorFallback::FirstPersona) => {
                debug!(selector, "Unknown persona selector, using first persona");
                first
            }
            (None, SelectorFallback::NoMatch) => None,
        }
    }

    /// Keys of every loaded persona
    pub fn live_keys(&self) -> HashSet<String> {
        self.list().iter().map(|p| p.key.clone()).collect()
    }
}

/// Read every `*.json` card in `dir`, skipping the ones that fail to parse
fn load_dir(dir: &Path) -> Vec<Arc<PersonaRecord>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Persona directory does not exist");
            return Vec::new();
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot read persona directory");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(".json"))
        })
        .collect();
    files.sort_by_key(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });

    let mut records: Vec<Arc<PersonaRecord>> = Vec::with_capacity(files.len());
    for path in files {
        match PersonaRecord::from_file(&path) {
            Ok(record) => records.push(Arc::new(record)),
            Err(e) => warn!(error = %e.format_for_log(), "Skipping persona definition"),
        }
    }

    info!(dir = %dir.display(), count = records.len(), "Loaded persona definitions");
    records
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
