//! Language-model backends
//!
//! The [`ChatModel`] abstraction plus the OpenAI-compatible client used in
//! production and a mock used by tests.

mod mock;
mod openai;
mod traits;

pub use mock::{MockChatModel, MockConfig, RecordedCall};
pub use openai::{OpenAiChatModel, OpenAiConfig};
pub use traits::*;
