//! Application wiring
//!
//! Builds the persona store, summary cache, lock and chat model from a
//! configuration, once, and hands them to the server and CLI commands.

use std::sync::Arc;

use crate::backend::{OpenAiChatModel, OpenAiConfig, SharedChatModel};
use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::persona::PersonaStore;
use crate::summary::{
    EnsureReport, FileLock, LlmSummaryGenerator, SummaryOptions, SummaryService, SummaryStore,
};

/// Shared application state
pub struct AppContext {
    pub config: CoordinatorConfig,
    pub model: SharedChatModel,
    pub personas: Arc<PersonaStore>,
    pub summaries: Arc<SummaryService>,
}

impl AppContext {
    /// Wire everything around an existing chat model
    pub fn new(config: CoordinatorConfig, model: SharedChatModel) -> Self {
        let personas = Arc::new(PersonaStore::new(config.persona_dir()));
        let lock = FileLock::in_dir(&config.cache_dir()).with_stale_after(config.stale_lock_after());

        let summaries = SummaryService::new(
            Arc::clone(&personas),
            SummaryStore::new(config.cache_dir()),
            Arc::new(lock),
            Arc::new(LlmSummaryGenerator::new(Arc::clone(&model))),
        )
        .with_options(SummaryOptions {
            lock_timeout: config.lock_timeout(),
            poll_interval: config.poll_interval(),
        });

        Self {
            config,
            model,
            personas,
            summaries: Arc::new(summaries),
        }
    }

    /// Wire everything around the configured OpenAI-compatible runtime
    pub fn from_config(config: CoordinatorConfig) -> Result<Self> {
        let model = OpenAiChatModel::new(OpenAiConfig::from(&config.llm))?;
        Ok(Self::new(config, Arc::new(model)))
    }

    /// Blocking batch pass run before the server accepts traffic
    pub async fn preflight(&self) -> Result<EnsureReport> {
        self.summaries
            .ensure_all(
                self.config.preflight_timeout(),
                self.config.preflight_poll_interval(),
            )
            .await
    }
}
