//! Error types for the persona coordinator
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - HTTP status mapping for the companion UI
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Language-model runtime errors (3xx)
    ConnectionFailed = 300,
    ConnectionTimeout = 301,
    ModelNotFound = 302,
    LlmResponse = 303,

    // Persona / request errors (4xx)
    NoPersonas = 400,
    MalformedDefinition = 401,
    InvalidRequest = 402,

    // Summary cache errors (5xx)
    GenerationFailed = 500,
    Busy = 501,
    CorruptCacheEntry = 502,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E501")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            400..=499 => 40,
            500..=599 => 50,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the coordinator
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Language-Model Runtime Errors
    // ─────────────────────────────────────────────────────────────

    /// Runtime unreachable
    #[error("Failed to reach language-model runtime at {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Runtime request timed out
    #[error("Request to {url} timed out after {timeout_secs}s")]
    ConnectionTimeout { url: String, timeout_secs: u64 },

    /// Requested model is not pulled on the runtime
    #[error("Model '{model}' is not available on the language-model runtime")]
    ModelNotFound { model: String, available: Vec<String> },

    /// Runtime answered with an error or an unusable body
    #[error("Language-model runtime error: {message}")]
    LlmResponse { message: String, retryable: bool },

    // ─────────────────────────────────────────────────────────────
    // Persona / Request Errors
    // ─────────────────────────────────────────────────────────────

    /// The persona directory holds no usable definitions
    #[error("No persona definitions found in {}", dir.display())]
    NoPersonas { dir: PathBuf },

    /// A persona definition file could not be parsed
    #[error("Malformed persona definition {}: {reason}", path.display())]
    MalformedDefinition { path: PathBuf, reason: String },

    /// Request body rejected by the HTTP layer
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // ─────────────────────────────────────────────────────────────
    // Summary Cache Errors
    // ─────────────────────────────────────────────────────────────

    /// Summary generation failed; nothing was persisted
    #[error("Failed to generate summary for {persona}: {message}")]
    Generation {
        persona: String,
        message: String,
        retryable: bool,
    },

    /// Another process holds the regeneration lock and the cache is stale
    #[error("Summary for {persona} is being rebuilt elsewhere (waited {waited_secs}s)")]
    Busy { persona: String, waited_secs: u64 },

    /// A cache file exists but cannot be decoded
    #[error("Corrupt summary cache entry {}: {reason}", path.display())]
    CorruptCacheEntry { path: PathBuf, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::InternalError,

            Error::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Error::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::ModelNotFound { .. } => ErrorCode::ModelNotFound,
            Error::LlmResponse { .. } => ErrorCode::LlmResponse,

            Error::NoPersonas { .. } => ErrorCode::NoPersonas,
            Error::MalformedDefinition { .. } => ErrorCode::MalformedDefinition,
            Error::InvalidRequest { .. } => ErrorCode::InvalidRequest,

            Error::Generation { .. } => ErrorCode::GenerationFailed,
            Error::Busy { .. } => ErrorCode::Busy,
            Error::CorruptCacheEntry { .. } => ErrorCode::CorruptCacheEntry,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is transient and the caller should retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConnectionFailed { .. } | Error::ConnectionTimeout { .. } | Error::Busy { .. } => {
                true
            }
            Error::LlmResponse { retryable, .. } | Error::Generation { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    /// HTTP status the server layer answers with for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Busy { .. } => 503,
            Error::NoPersonas { .. } => 404,
            Error::InvalidRequest { .. } => 400,
            Error::Generation { .. }
            | Error::ConnectionFailed { .. }
            | Error::ConnectionTimeout { .. }
            | Error::ModelNotFound { .. }
            | Error::LlmResponse { .. } => 502,
            _ => 500,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'persona-coordinator config init' to create a default configuration file."
                    .to_string(),
            ),
            Error::ConfigParse { .. } | Error::ConfigValidation { .. } => Some(
                "Check your configuration file. Run 'persona-coordinator config validate' to see details."
                    .to_string(),
            ),
            Error::ConnectionFailed { .. } | Error::ConnectionTimeout { .. } => Some(
                "Start the Ollama app or daemon and check OLLAMA_BASE, then try again.".to_string(),
            ),
            Error::ModelNotFound { model, available } => {
                let mut hint = format!("Pull the model first: ollama pull {}", model);
                if !available.is_empty() {
                    hint.push_str(&format!("\nAvailable models: {}", available.join(", ")));
                }
                Some(hint)
            }
            Error::NoPersonas { .. } => Some(
                "Add at least one persona JSON card to the persona directory (PERSONA_DIR)."
                    .to_string(),
            ),
            Error::Busy { .. } => Some(
                "Another process is rebuilding persona summaries. Retry in a few seconds."
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", self.code().as_str(), self);

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn connection_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::InvalidRequest {
            message: message.into(),
        }
    }

    /// Wrap a runtime failure as a generation failure for `persona`
    pub fn generation(persona: impl Into<String>, cause: &Error) -> Self {
        Error::Generation {
            persona: persona.into(),
            message: cause.to_string(),
            retryable: cause.is_retryable(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::Busy.as_str(), "E501");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigValidation.exit_code(), 10);
        assert_eq!(ErrorCode::IoWrite.exit_code(), 20);
        assert_eq!(ErrorCode::ModelNotFound.exit_code(), 30);
        assert_eq!(ErrorCode::NoPersonas.exit_code(), 40);
        assert_eq!(ErrorCode::GenerationFailed.exit_code(), 50);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_summary_taxonomy_is_distinguishable() {
        let busy = Error::Busy {
            persona: "Eeva".into(),
            waited_secs: 60,
        };
        let none = Error::NoPersonas {
            dir: PathBuf::from("personas"),
        };
        let gen = Error::generation("Eeva", &Error::connection_failed("http://x", "refused"));

        assert_eq!(busy.http_status(), 503);
        assert_eq!(none.http_status(), 404);
        assert_eq!(gen.http_status(), 502);
        assert_ne!(busy.code(), gen.code());
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::Busy {
            persona: "Eeva".into(),
            waited_secs: 1
        }
        .is_retryable());
        assert!(Error::generation("Eeva", &Error::connection_failed("u", "down")).is_retryable());
        assert!(!Error::generation(
            "Eeva",
            &Error::ModelNotFound {
                model: "llama3".into(),
                available: vec![]
            }
        )
        .is_retryable());
        assert!(!Error::NoPersonas {
            dir: PathBuf::from("p")
        }
        .is_retryable());
    }

    #[test]
    fn test_model_not_found_suggestion_lists_models() {
        let err = Error::ModelNotFound {
            model: "llama3.1:8b".into(),
            available: vec!["mistral:7b".into()],
        };
        let hint = err.suggestion().unwrap();
        assert!(hint.contains("ollama pull llama3.1:8b"));
        assert!(hint.contains("mistral:7b"));
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::ConfigNotFound {
            path: PathBuf::from("/test/config.toml"),
        };
        let formatted = err.format_for_terminal();
        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::invalid_request("message must not be empty");
        let formatted = err.format_for_log();
        assert!(formatted.contains("[E402]"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert_eq!(err.code(), ErrorCode::IoNotFound);
    }
}
