//! Cross-process regeneration lock
//!
//! The lock is a marker file created with an exclusive create, holding the
//! owner's identifier as bare text. Any process that can see the cache
//! directory takes part: the server, a preflight run, a second server.
//!
//! ```text
//! Unlocked --create_new ok--> Held(owner) --release--> Unlocked
//!     |                            ^
//!     +--exists, owner == me-------+   (reentrant)
//!     +--exists, other owner--> poll until timeout --> false
//! ```

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Marker file name inside the cache directory
pub const LOCK_FILE_NAME: &str = ".summary.lock";

/// Lower bound on the poll interval
const MIN_POLL: Duration = Duration::from_millis(10);

/// Mutual exclusion for summary regeneration
#[async_trait]
pub trait RegenerationLock: Send + Sync {
    /// Try to take the lock, polling until `timeout` has elapsed
    ///
    /// Returns true when the lock was created or is already ours.
    async fn acquire(&self, timeout: Duration, poll: Duration) -> bool;

    /// Remove the lock whoever holds it; a missing lock is fine
    fn release(&self);

    /// Remove the lock only if it is ours, returning whether it was removed
    fn release_if_owned(&self) -> bool;

    /// Whether the lock is currently held by this owner
    fn is_held(&self) -> bool;

    /// Current holder's identifier, if locked
    fn holder(&self) -> Option<String>;

    /// Whether a marker exists at all, including one with no owner written
    fn is_present(&self) -> bool;
}

/// Outcome of a single acquisition attempt
#[derive(Debug)]
enum Attempt {
    Created,
    Reentrant,
    Held(String),
    Failed(std::io::Error),
}

// ─────────────────────────────────────────────────────────────────
// File Lock
// ─────────────────────────────────────────────────────────────────

/// Marker-file lock; see the module docs
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    owner: String,
    stale_after: Option<Duration>,
}

impl FileLock {
    /// Lock owned by the current process id
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_owner(path, std::process::id().to_string())
    }

    /// Lock with an explicit owner identifier
    pub fn with_owner(path: impl Into<PathBuf>, owner: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            owner: owner.into(),
            stale_after: None,
        }
    }

    /// Lock for `<cache_dir>/.summary.lock`
    pub fn in_dir(cache_dir: &Path) -> Self {
        Self::new(cache_dir.join(LOCK_FILE_NAME))
    }

    /// Treat markers older than `age`, or held by a dead local pid, as abandoned
    pub fn with_stale_after(mut self, age: Option<Duration>) -> Self {
        self.stale_after = age;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn try_acquire(&self) -> Attempt {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return Attempt::Failed(e);
            }
        }

        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(mut file) => match file.write_all(self.owner.as_bytes()) {
                Ok(()) => Attempt::Created,
                Err(e) => {
                    // an unlabelled marker would block everyone until timeout
                    let _ = fs::remove_file(&self.path);
                    Attempt::Failed(e)
                }
            },
            Err(e) if e.kind() == ErrorKind::AlreadyExists => match self.marker_content() {
                Some(holder) if holder == self.owner => Attempt::Reentrant,
                // empty when the holder has not written its id yet, or crashed first
                Some(holder) => Attempt::Held(holder),
                // just released
                None => Attempt::Held(String::new()),
            },
            Err(e) => Attempt::Failed(e),
        }
    }

    /// Trimmed marker text, empty for an unlabelled marker; `None` when absent
    fn marker_content(&self) -> Option<String> {
        fs::read_to_string(&self.path)
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Remove `holder`'s marker if it looks abandoned
    ///
    /// An unlabelled marker can only be judged by age.
    fn clear_if_stale(&self, holder: &str) -> bool {
        let Some(max_age) = self.stale_after else {
            return false;
        };

        let age = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        let too_old = age.is_some_and(|age| age > max_age);
        let dead = holder.parse::<u32>().is_ok_and(|pid| !pid_alive(pid));

        if !(too_old || dead) {
            return false;
        }
        // only remove the marker we judged, not one a new holder just created
        if self.marker_content().as_deref() != Some(holder) {
            return false;
        }

        warn!(
            path = %self.path.display(),
            holder,
            age = ?age,
            dead,
            "Removing abandoned summary lock"
        );
        remove_marker(&self.path);
        true
    }
}

#[async_trait]
impl RegenerationLock for FileLock {
    async fn acquire(&self, timeout: Duration, poll: Duration) -> bool {
        let started = Instant::now();
        let poll = poll.max(MIN_POLL);

        loop {
            match self.try_acquire() {
                Attempt::Created => {
                    debug!(path = %self.path.display(), owner = %self.owner, "Summary lock acquired");
                    return true;
                }
                Attempt::Reentrant => {
                    debug!(owner = %self.owner, "Summary lock already held by this owner");
                    return true;
                }
                Attempt::Held(holder) => {
                    if self.clear_if_stale(&holder) {
                        continue;
                    }
                    debug!(holder = %holder, "Summary lock busy");
                }
                Attempt::Failed(e) => {
                    debug!(path = %self.path.display(), error = %e, "Summary lock attempt failed");
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                info!(
                    waited_ms = elapsed.as_millis() as u64,
                    holder = ?self.holder(),
                    "Gave up waiting for summary lock"
                );
                return false;
            }
            tokio::time::sleep(poll.min(timeout - elapsed)).await;
        }
    }

    fn release(&self) {
        remove_marker(&self.path);
    }

    fn release_if_owned(&self) -> bool {
        if self.is_held() {
            self.release();
            true
        } else {
            debug!(owner = %self.owner, holder = ?self.holder(), "Not releasing a lock we do not hold");
            false
        }
    }

    fn is_held(&self) -> bool {
        self.holder().as_deref() == Some(self.owner.as_str())
    }

    fn holder(&self) -> Option<String> {
        self.marker_content().filter(|s| !s.is_empty())
    }

    fn is_present(&self) -> bool {
        self.path.exists()
    }
}

fn remove_marker(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Summary lock released"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove summary lock"),
    }
}

/// Whether `pid` is a live process on this host
#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

/// Liveness is unknown here, so only the age check applies
#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    true
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
