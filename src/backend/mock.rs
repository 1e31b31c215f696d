//! Mock chat model for testing
//!
//! Deterministic replies, optional failure and latency, and a log of every
//! call so tests can assert how often the runtime was hit.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::time::Duration;

use crate::error::{Error, Result};

use super::ChatModel;

// ─────────────────────────────────────────────────────────────────
// Mock Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for mock model behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Fixed reply; `None` echoes the first line of the user prompt
    pub response: Option<String>,

    /// Fail every completion with a connection error
    pub fail: bool,

    /// Simulated latency per completion (ms)
    pub latency_ms: u64,

    /// Models reported by `list_models`
    pub models: Vec<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            response: None,
            fail: false,
            latency_ms: 0,
            models: vec!["mock-model".to_string()],
        }
    }
}

/// One recorded `complete` call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
}

// ─────────────────────────────────────────────────────────────────
// Mock Model
// ─────────────────────────────────────────────────────────────────

/// Mock implementation of ChatModel for testing
#[derive(Default)]
pub struct MockChatModel {
    config: RwLock<MockConfig>,
    calls: RwLock<Vec<RecordedCall>>,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config: RwLock::new(config),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Mock that always answers `text`
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::with_config(MockConfig {
            response: Some(text.into()),
            ..Default::default()
        })
    }

    /// Mock whose completions always fail
    pub fn failing() -> Self {
        Self::with_config(MockConfig {
            fail: true,
            ..Default::default()
        })
    }

    pub fn set_response(&self, text: impl Into<String>) {
        self.config.write().response = Some(text.into());
    }

    pub fn set_failing(&self, fail: bool) {
        self.config.write().fail = fail;
    }

    /// Number of `complete` calls so far, failed ones included
    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.read().last().cloned()
    }

    /// Reset the call log
    pub fn reset_counts(&self) {
        self.calls.write().clear();
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.calls.write().push(RecordedCall {
            system: system.to_string(),
            user: user.to_string(),
        });

        let config = self.config.read().clone();
        if config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.latency_ms)).await;
        }

        if config.fail {
            return Err(Error::connection_failed("mock://", "simulated failure"));
        }

        Ok(config.response.unwrap_or_else(|| {
            let first = user.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            format!("mock reply to: {}", first.trim())
        }))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.config.read().models.clone())
    }
}
