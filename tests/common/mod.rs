//! Common test utilities and fixtures
//!
//! Every test gets its own temporary persona directory and config file so
//! nothing touches the user's real configuration.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use persona_coordinator::backend::MockChatModel;
use persona_coordinator::persona::{PersonaRecord, PersonaStore};
use persona_coordinator::summary::{
    fingerprint, FileLock, LlmSummaryGenerator, SummaryEntry, SummaryService, SummaryStore,
    LOCK_FILE_NAME,
};
use tempfile::TempDir;

pub const EEVA: &str = r#"{"key": "Eeva", "style": "nerdy", "lore": ["loves graphs"]}"#;
pub const CINDY: &str = r#"{"key": "Cindy", "style": "pragmatic", "lore": ["builds things"]}"#;

/// Port 9 (discard) is never an LLM runtime
pub const UNREACHABLE_LLM: &str = "http://127.0.0.1:9/v1";

/// Isolated persona directory plus a config file pointing at it
pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let env = Self {
            temp_dir: TempDir::new().unwrap(),
        };
        fs::create_dir_all(env.persona_dir()).unwrap();
        env
    }

    /// Environment with the two standard personas
    pub fn with_standard_personas() -> Self {
        let env = Self::new();
        env.add_persona("eeva", EEVA);
        env.add_persona("cindy", CINDY);
        env
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn persona_dir(&self) -> PathBuf {
        self.path().join("personas")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.persona_dir().join(".cache")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.cache_dir().join(LOCK_FILE_NAME)
    }

    /// Write `<stem>.json` into the persona directory
    pub fn add_persona(&self, stem: &str, json: &str) -> PathBuf {
        let path = self.persona_dir().join(format!("{}.json", stem));
        fs::write(&path, json).unwrap();
        path
    }

    /// Write a config for this environment, with `extra` TOML appended
    pub fn write_config(&self, extra: &str) -> PathBuf {
        let content = format!(
            r#"
[llm]
base_url = "{llm}"
model = "mock-model"
timeout_secs = 2
max_retries = 0
check_model_on_start = false

[personas]
dir = "{dir}"

[logging]
level = "warn"

{extra}
"#,
            llm = UNREACHABLE_LLM,
            dir = self.persona_dir().display(),
            extra = extra,
        );
        let path = self.path().join("persona-coordinator.toml");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn config_path(&self) -> String {
        self.path()
            .join("persona-coordinator.toml")
            .to_string_lossy()
            .into_owned()
    }

    /// Record as the store would load it from `<stem>.json`
    pub fn record(&self, stem: &str) -> PersonaRecord {
        PersonaRecord::from_file(&self.persona_dir().join(format!("{}.json", stem))).unwrap()
    }

    /// Store a fresh summary for `<stem>.json` without calling any model
    pub fn seed_summary(&self, stem: &str, text: &str) -> SummaryEntry {
        let record = self.record(stem);
        SummaryStore::new(self.cache_dir())
            .save(&record.key, &fingerprint(&record), text)
            .unwrap()
    }

    /// Service over this directory with an explicit lock owner
    pub fn service(&self, model: Arc<MockChatModel>, owner: &str) -> SummaryService {
        SummaryService::new(
            Arc::new(PersonaStore::new(self.persona_dir())),
            SummaryStore::new(self.cache_dir()),
            Arc::new(FileLock::with_owner(self.lock_path(), owner)),
            Arc::new(LlmSummaryGenerator::new(model)),
        )
    }

    /// Lock handle for a foreign owner on this cache directory
    pub fn lock(&self, owner: &str) -> FileLock {
        FileLock::with_owner(self.lock_path(), owner)
    }
}
