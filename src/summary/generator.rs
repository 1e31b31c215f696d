//! Summary generation through the chat model

use async_trait::async_trait;
use tracing::debug;

use crate::backend::SharedChatModel;
use crate::error::{Error, Result};
use crate::persona::prompts::summary_prompt;
use crate::persona::PersonaRecord;

/// Produces the narrative summary for one persona
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// Non-empty summary text, or [`Error::Generation`]
    async fn generate(&self, record: &PersonaRecord) -> Result<String>;
}

/// Generator backed by a [`ChatModel`](crate::backend::ChatModel)
pub struct LlmSummaryGenerator {
    model: SharedChatModel,
}

impl LlmSummaryGenerator {
    pub fn new(model: SharedChatModel) -> Self {
        Self { model }
    }
}

#[async_trait]
impl SummaryGenerator for LlmSummaryGenerator {
    async fn generate(&self, record: &PersonaRecord) -> Result<String> {
        let (system, user) = summary_prompt(record);
        debug!(persona = %record.key, model = %self.model.model(), "Requesting summary");

        let text = self
            .model
            .complete(&system, &user)
            .await
            .map_err(|e| Error::generation(&record.key, &e))?;

        if text.trim().is_empty() {
            return Err(Error::Generation {
                persona: record.key.clone(),
                message: "model returned an empty summary".to_string(),
                retryable: true,
            });
        }
        Ok(text)
    }
}
