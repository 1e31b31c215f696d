//! Prompt construction for summaries, greetings and chat

use serde::{Deserialize, Serialize};

use super::types::PersonaRecord;

/// Conversation rules appended to every persona system prompt
pub const BASE_RULES: &str = "Keep answers concise and structured.\n\
If the user asks factual/grounded questions in the future, you may call tools.\n\
For now, answer directly (no tools). If unsure, say so.";

const SUMMARY_SYSTEM: &str = "You condense biographies into short identity briefs.";

/// One prior chat turn sent by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// (system, user) pair asking for a compact identity summary
pub fn summary_prompt(record: &PersonaRecord) -> (String, String) {
    let user = format!(
        "Create a compact identity summary (<= 180 tokens) for: {}\nStyle: {}\n\nLore:\n{}\n\nReturn only the summary.",
        record.name(),
        record.style_or_default(),
        record.lore.join("\n"),
    );
    (SUMMARY_SYSTEM.to_string(), user)
}

/// System prompt for greetings and chat, built around a cached identity summary
pub fn system_prompt(record: &PersonaRecord, identity: &str) -> String {
    format!(
        "You are {}, a {} assistant.\n\nIdentity:\n{}\n\n{}",
        record.who(),
        record.style_or_default(),
        identity.trim(),
        BASE_RULES
    )
}

/// User prompt asking for a one or two sentence welcome
pub fn greeting_prompt(record: &PersonaRecord) -> String {
    format!(
        "Generate a short welcome message for the chat.\n\
         Constraints:\n\
         - 1 to 2 sentences max.\n\
         - Reflect the persona's style.\n\
         - Invite the user to ask a question.\n\
         - No system or meta text, just the greeting.\n\
         Optional greeting hint: {}",
        record.greeting_hint().unwrap_or("(none)")
    )
}

/// Render the last `turns` history entries plus the new message
///
/// Any role other than `assistant` is rendered as the user.
pub fn chat_prompt(history: &[ChatTurn], message: &str, turns: usize) -> String {
    let recent = &history[history.len().saturating_sub(turns)..];

    recent
        .iter()
        .map(|turn| {
            if turn.role.eq_ignore_ascii_case("assistant") {
                format!("[Assistant]\n{}", turn.content)
            } else {
                format!("[User]\n{}", turn.content)
            }
        })
        .chain(std::iter::once(format!("[User]\n{}", message)))
        .collect::<Vec<_>>()
        .join("\n\n")
}
