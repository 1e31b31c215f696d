//! Configuration system for the persona coordinator
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (`OLLAMA_BASE`, `PERSONA_*`, `COORD_*`)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// File name searched for in the working directory
pub const CONFIG_FILE_NAME: &str = "persona-coordinator.toml";

/// Main coordinator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Language-model runtime connection
    pub llm: LlmSettings,

    /// Persona definition directory
    pub personas: PersonaSettings,

    /// Summary cache and regeneration lock
    pub summary: SummarySettings,

    /// HTTP server for the companion UI
    pub server: ServerSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// OpenAI-compatible runtime settings (Ollama by default)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// API base URL, including the `/v1` suffix
    pub base_url: String,

    /// API key (empty string for local servers like Ollama)
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retries on transient failures
    pub max_retries: u32,

    /// Verify the model is pulled before serving or preflight
    pub check_model_on_start: bool,
}

/// Persona directory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaSettings {
    /// Directory holding one JSON card per persona
    pub dir: String,

    /// Cache subdirectory, relative to `dir`
    pub cache_subdir: String,
}

/// Summary cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    /// How long a single request waits for the regeneration lock
    pub lock_timeout_secs: u64,

    /// Poll interval while waiting for the lock
    pub poll_interval_ms: u64,

    /// How long preflight waits for the lock
    pub preflight_timeout_secs: u64,

    /// Poll interval used by preflight
    pub preflight_poll_interval_ms: u64,

    /// Age after which a lock marker is considered abandoned (0 = never)
    pub stale_lock_secs: u64,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Number of history turns forwarded to the model on chat
    pub history_turns: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: String::new(),
            model: "llama3.1:8b".to_string(),
            temperature: 0.1,
            timeout_secs: 120,
            max_retries: 2,
            check_model_on_start: true,
        }
    }
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            dir: "personas".to_string(),
            cache_subdir: ".cache".to_string(),
        }
    }
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 60,
            poll_interval_ms: 200,
            preflight_timeout_secs: 900,
            preflight_poll_interval_ms: 250,
            stale_lock_secs: 0,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            history_turns: 6,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = Self::from_toml(&content)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            source: Some(e),
        })
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // An explicit path must exist
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            return if path.exists() {
                Ok(Some(path))
            } else {
                Err(Error::ConfigNotFound { path })
            };
        }

        let search_paths = [
            PathBuf::from(CONFIG_FILE_NAME),
            dirs::config_dir()
                .map(|p| p.join("persona-coordinator").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Runtime settings
        if let Some(val) = var("OLLAMA_BASE") {
            self.llm.base_url = normalize_base_url(&val);
        }
        if let Some(val) = var("PERSONA_MODEL") {
            self.llm.model = val;
        }
        if let Some(val) = var("PERSONA_TEMPERATURE") {
            // Unparseable values keep the configured temperature
            if let Ok(t) = val.trim().parse() {
                self.llm.temperature = t;
            }
        }
        if let Some(val) = var("COORD_LLM_API_KEY") {
            self.llm.api_key = val;
        }

        // Persona settings
        if let Some(val) = var("PERSONA_DIR") {
            self.personas.dir = val;
        }

        // Summary settings
        if let Some(val) = var("COORD_LOCK_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.summary.lock_timeout_secs = n;
            }
        }
        if let Some(val) = var("COORD_STALE_LOCK_SECS") {
            if let Ok(n) = val.parse() {
                self.summary.stale_lock_secs = n;
            }
        }

        // Server settings
        if let Some(val) = var("COORD_HOST") {
            self.server.host = val;
        }
        if let Some(val) = var("COORD_PORT") {
            if let Ok(n) = val.parse() {
                self.server.port = n;
            }
        }

        // Logging settings
        if let Some(val) = var("COORD_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = var("COORD_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Some(val) = var("COORD_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.personas.dir = expand_path(&self.personas.dir);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = self.llm.base_url.trim();
        if url.is_empty() {
            return Err(Error::config_field_invalid(
                "llm.base_url",
                "LLM base URL cannot be empty",
            ));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::config_field_invalid(
                "llm.base_url",
                format!("LLM base URL must start with http:// or https:// (got '{}')", url),
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(Error::config_field_invalid("llm.model", "Model cannot be empty"));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::config_field_invalid(
                "llm.temperature",
                "temperature must be between 0.0 and 2.0",
            ));
        }

        if self.personas.dir.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "personas.dir",
                "Persona directory cannot be empty",
            ));
        }

        if self.summary.poll_interval_ms == 0 || self.summary.preflight_poll_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "summary.poll_interval_ms",
                "Poll intervals must be greater than zero",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Persona definition directory
    pub fn persona_dir(&self) -> PathBuf {
        PathBuf::from(&self.personas.dir)
    }

    /// Directory holding summary cache files and the lock marker
    pub fn cache_dir(&self) -> PathBuf {
        self.persona_dir().join(&self.personas.cache_subdir)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.summary.lock_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.summary.poll_interval_ms)
    }

    pub fn preflight_timeout(&self) -> Duration {
        Duration::from_secs(self.summary.preflight_timeout_secs)
    }

    pub fn preflight_poll_interval(&self) -> Duration {
        Duration::from_millis(self.summary.preflight_poll_interval_ms)
    }

    /// Abandoned-marker threshold, `None` when recovery is disabled
    pub fn stale_lock_after(&self) -> Option<Duration> {
        match self.summary.stale_lock_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// `host:port` the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Accept both `http://host:11434` and `http://host:11434/v1`
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location used by `config init`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("persona-coordinator").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Persona Coordinator Configuration

[llm]
# OpenAI-compatible base URL (Ollama serves one under /v1). Env: OLLAMA_BASE
base_url = "http://localhost:11434/v1"

# API key (leave empty for Ollama). Env: COORD_LLM_API_KEY
api_key = ""

# Model used for summaries, greetings and chat. Env: PERSONA_MODEL
model = "llama3.1:8b"

# Sampling temperature. Env: PERSONA_TEMPERATURE
temperature = 0.1

# Request timeout in seconds
timeout_secs = 120

# Maximum retries on transient failures
max_retries = 2

# Fail fast at startup when the model is not pulled
check_model_on_start = true

[personas]
# Directory with one JSON card per persona. Env: PERSONA_DIR
dir = "personas"

# Summary cache location, relative to the persona directory
cache_subdir = ".cache"

[summary]
# Wait for the regeneration lock during a request. Env: COORD_LOCK_TIMEOUT_SECS
lock_timeout_secs = 60
poll_interval_ms = 200

# Wait for the regeneration lock during preflight
preflight_timeout_secs = 900
preflight_poll_interval_ms = 250

# Remove lock markers older than this or held by a dead process (0 = never).
# Env: COORD_STALE_LOCK_SECS
stale_lock_secs = 0

[server]
# Env: COORD_HOST / COORD_PORT
host = "127.0.0.1"
port = 8000

# History turns forwarded to the model on chat
history_turns = 6

[logging]
# Log level: trace, debug, info, warn, error. Env: COORD_LOG_LEVEL
level = "info"

# Log file path (comment out to disable file logging). Env: COORD_LOG_FILE
# file = "~/.local/state/persona-coordinator/coordinator.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging. Env: COORD_LOG_JSON
json_format = false
"#
    .to_string()
}
