//! Chat model trait
//!
//! Everything that talks to the language-model runtime goes through
//! [`ChatModel`], so summaries and chat can run against the real runtime or
//! a mock.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};

/// A chat-completion capable language model
///
/// The trait is object-safe; callers share it as [`SharedChatModel`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Backend name for logs ("openai", "mock")
    fn name(&self) -> &'static str;

    /// Model identifier requests are sent with
    fn model(&self) -> &str;

    /// Run one system + user exchange and return the assistant text
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Models the runtime currently serves
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Fail with [`Error::ModelNotFound`] unless the configured model is served
    async fn ensure_model_available(&self) -> Result<()> {
        let available = self.list_models().await?;
        if available.iter().any(|m| model_matches(self.model(), m)) {
            Ok(())
        } else {
            Err(Error::ModelNotFound {
                model: self.model().to_string(),
                available,
            })
        }
    }
}

/// Shared handle to a chat model
pub type SharedChatModel = Arc<dyn ChatModel>;

/// Ollama lists untagged models with an implicit `:latest`
fn model_matches(wanted: &str, listed: &str) -> bool {
    if wanted == listed {
        return true;
    }
    match (wanted.contains(':'), listed.strip_suffix(":latest")) {
        (false, Some(base)) => base == wanted,
        _ => false,
    }
}
