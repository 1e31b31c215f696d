//! Persona cards: loading, selector resolution and prompt construction.
//!
//! Each `*.json` file in the persona directory describes one assistant
//! identity (display name, style, lore, voice hints).

pub mod prompts;
pub mod store;
pub mod types;

pub use prompts::ChatTurn;
pub use store::{PersonaList, PersonaStore, SelectorFallback};
pub use types::PersonaRecord;
