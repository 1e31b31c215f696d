//! Summary orchestration
//!
//! [`SummaryService`] is the only component that takes the regeneration
//! lock. Reads never lock: a fresh cache entry is returned straight away.
//! Regeneration is serialized twice, by an in-process mutex (every task in a
//! process shares one lock identity) and by the cross-process lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::persona::{PersonaRecord, PersonaStore};

use super::fingerprint::fingerprint;
use super::generator::SummaryGenerator;
use super::lock::RegenerationLock;
use super::store::{SummaryEntry, SummaryStore};

/// Lock wait settings for single-persona requests
#[derive(Debug, Clone, Copy)]
pub struct SummaryOptions {
    pub lock_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Outcome of a batch pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureReport {
    /// Summaries generated in this pass
    pub built: usize,
    /// Summaries that were already fresh
    pub skipped: usize,
    /// Orphaned cache entries deleted
    pub removed: usize,
    /// Personas whose generation failed
    pub failed: Vec<String>,
    /// False when the lock was busy and nothing was attempted
    pub ran: bool,
}

impl EnsureReport {
    /// `(built, skipped)`
    pub fn counts(&self) -> (usize, usize) {
        (self.built, self.skipped)
    }
}

/// Cache state of one persona, for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    Stale,
    Missing,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Fresh => "fresh",
            CacheStatus::Stale => "stale",
            CacheStatus::Missing => "missing",
        }
    }
}

/// Releases the cross-process lock on drop, if this call acquired it
struct LockRelease<'a> {
    lock: &'a dyn RegenerationLock,
    acquired: bool,
}

impl Drop for LockRelease<'_> {
    fn drop(&mut self) {
        if self.acquired {
            self.lock.release_if_owned();
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Summary Service
// ─────────────────────────────────────────────────────────────────

pub struct SummaryService {
    personas: Arc<PersonaStore>,
    cache: SummaryStore,
    lock: Arc<dyn RegenerationLock>,
    generator: Arc<dyn SummaryGenerator>,
    local: Mutex<()>,
    options: SummaryOptions,
}

impl SummaryService {
    pub fn new(
        personas: Arc<PersonaStore>,
        cache: SummaryStore,
        lock: Arc<dyn RegenerationLock>,
        generator: Arc<dyn SummaryGenerator>,
    ) -> Self {
        Self {
            personas,
            cache,
            lock,
            generator,
            local: Mutex::new(()),
            options: SummaryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SummaryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn personas(&self) -> &Arc<PersonaStore> {
        &self.personas
    }

    pub fn cache(&self) -> &SummaryStore {
        &self.cache
    }

    pub fn lock(&self) -> &Arc<dyn RegenerationLock> {
        &self.lock
    }

    // ─────────────────────────────────────────────────────────────
    // Single Persona
    // ─────────────────────────────────────────────────────────────

    /// Return a fresh summary for the persona `selector` resolves to,
    /// generating it if the cache is missing or stale
    pub async fn get_or_build(&self, selector: Option<&str>) -> Result<SummaryEntry> {
        let record = self.resolve(selector)?;
        self.get_or_build_record(&record).await
    }

    /// [`get_or_build`](Self::get_or_build) for an already resolved persona
    pub async fn get_or_build_record(&self, record: &PersonaRecord) -> Result<SummaryEntry> {
        let hash = fingerprint(record);

        if let Some(entry) = self.fresh_entry(&record.key, &hash) {
            debug!(persona = %record.key, "Summary cache hit");
            return Ok(entry);
        }

        let started = Instant::now();
        let Ok(_local) = tokio::time::timeout(self.options.lock_timeout, self.local.lock()).await
        else {
            return self.fresh_or_busy(record, &hash, started);
        };

        // another task in this process may have just built it
        if let Some(entry) = self.fresh_entry(&record.key, &hash) {
            return Ok(entry);
        }

        let acquired = if self.lock.is_held() {
            false
        } else {
            let remaining = self.options.lock_timeout.saturating_sub(started.elapsed());
            if !self.lock.acquire(remaining, self.options.poll_interval).await {
                return self.fresh_or_busy(record, &hash, started);
            }
            true
        };
        let _release = LockRelease {
            lock: self.lock.as_ref(),
            acquired,
        };

        // another process may have finished between the first check and the lock
        if let Some(entry) = self.fresh_entry(&record.key, &hash) {
            return Ok(entry);
        }

        self.build(record, &hash).await
    }

    /// Fresh cached entry for `record`, without generating anything
    pub fn cached(&self, record: &PersonaRecord) -> Option<SummaryEntry> {
        self.fresh_entry(&record.key, &fingerprint(record))
    }

    pub fn status(&self, record: &PersonaRecord) -> CacheStatus {
        match self.cache.load(&record.key) {
            Some(entry) if entry.is_fresh_for(&fingerprint(record)) => CacheStatus::Fresh,
            Some(_) => CacheStatus::Stale,
            None => CacheStatus::Missing,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Batch
    // ─────────────────────────────────────────────────────────────

    /// Make every persona's summary fresh, holding the lock for the whole pass
    ///
    /// If the lock cannot be taken within `timeout` someone else is already
    /// doing this work: the report comes back empty with `ran == false`.
    /// A failed generation is logged and recorded; the pass continues.
    pub async fn ensure_all(&self, timeout: Duration, poll: Duration) -> Result<EnsureReport> {
        let started = Instant::now();
        let Ok(_local) = tokio::time::timeout(timeout, self.local.lock()).await else {
            info!("Summary regeneration already running in this process, skipping batch");
            return Ok(EnsureReport::default());
        };

        let acquired = if self.lock.is_held() {
            false
        } else {
            let remaining = timeout.saturating_sub(started.elapsed());
            if !self.lock.acquire(remaining, poll).await {
                info!(holder = ?self.lock.holder(), "Summary lock busy, skipping batch");
                return Ok(EnsureReport::default());
            }
            true
        };
        let _release = LockRelease {
            lock: self.lock.as_ref(),
            acquired,
        };

        let personas = self.personas.list();
        let mut report = EnsureReport {
            ran: true,
            removed: self.cache.sweep_orphans(&self.personas.live_keys())?,
            ..Default::default()
        };

        for record in personas.iter() {
            let hash = fingerprint(record);
            if self.fresh_entry(&record.key, &hash).is_some() {
                report.skipped += 1;
                continue;
            }

            match self.build(record, &hash).await {
                Ok(_) => report.built += 1,
                Err(e) => {
                    warn!(persona = %record.key, error = %e.format_for_log(), "Summary generation failed");
                    report.failed.push(record.key.clone());
                }
            }
        }

        info!(
            built = report.built,
            skipped = report.skipped,
            removed = report.removed,
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Summary preflight finished"
        );
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────

    fn resolve(&self, selector: Option<&str>) -> Result<Arc<PersonaRecord>> {
        if let Some(record) = self.personas.resolve(selector) {
            return Ok(record);
        }
        if self.personas.is_empty() {
            Err(Error::NoPersonas {
                dir: self.personas.dir().to_path_buf(),
            })
        } else {
            Err(Error::invalid_request(format!(
                "unknown persona '{}'",
                selector.unwrap_or_default()
            )))
        }
    }

    fn fresh_entry(&self, key: &str, hash: &str) -> Option<SummaryEntry> {
        self.cache.load(key).filter(|entry| entry.is_fresh_for(hash))
    }

    /// Last look at the cache after failing to get the lock
    fn fresh_or_busy(&self, record: &PersonaRecord, hash: &str, started: Instant) -> Result<SummaryEntry> {
        match self.fresh_entry(&record.key, hash) {
            Some(entry) => Ok(entry),
            None => {
                warn!(persona = %record.key, "Summary is being rebuilt elsewhere");
                Err(Error::Busy {
                    persona: record.key.clone(),
                    waited_secs: started.elapsed().as_secs(),
                })
            }
        }
    }

    /// Generate and persist; caller holds both locks
    async fn build(&self, record: &PersonaRecord, hash: &str) -> Result<SummaryEntry> {
        info!(persona = %record.key, "Generating summary");
        let started = Instant::now();

        let text = self.generator.generate(record).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Generation {
                persona: record.key.clone(),
                message: "model returned an empty summary".to_string(),
                retryable: true,
            });
        }

        let entry = self.cache.save(&record.key, hash, text)?;
        info!(
            persona = %record.key,
            chars = entry.summary.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Summary cached"
        );
        Ok(entry)
    }
}
