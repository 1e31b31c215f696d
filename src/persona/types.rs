//! Persona record types
//!
//! A persona card is a JSON object. The fields the coordinator reads are
//! typed; everything else rides along in `extra` so the fingerprint still
//! sees the whole definition.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Name used when the directory has no cards at all
pub const FALLBACK_KEY: &str = "Persona";

/// Style used when a card omits one
pub const DEFAULT_STYLE: &str = "helpful & concise";

// ─────────────────────────────────────────────────────────────────
// Persona Record
// ─────────────────────────────────────────────────────────────────

/// One assistant identity loaded from a definition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaRecord {
    /// Stable identifier, always non-blank after loading
    pub key: String,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    /// Biographical fragments, in order
    #[serde(default, deserialize_with = "lenient_lore", skip_serializing_if = "Vec::is_empty")]
    pub lore: Vec<String>,

    /// Label the UI uses to select this persona
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub coordinator_label: Option<String>,

    /// Voice hints (`greeting`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<Value>,

    /// Any other card fields (behavior, boundaries, emoji, assets, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersonaRecord {
    /// Parse one definition file
    ///
    /// A missing, non-string or blank `key` is replaced by the capitalized
    /// file stem.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::MalformedDefinition {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        Self::from_json(&content, stem).map_err(|reason| Error::MalformedDefinition {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse card JSON; `stem` supplies the key when the card has none
    pub fn from_json(content: &str, stem: &str) -> std::result::Result<Self, String> {
        let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        let Value::Object(mut card) = value else {
            return Err("persona card must be a JSON object".to_string());
        };

        let has_key = matches!(card.get("key"), Some(Value::String(k)) if !k.trim().is_empty());
        if !has_key {
            let key = capitalize(stem);
            if key.is_empty() {
                return Err("persona card has no key and no usable file name".to_string());
            }
            card.insert("key".to_string(), Value::String(key));
        }

        serde_json::from_value(Value::Object(card)).map_err(|e| e.to_string())
    }

    /// Built-in generic persona used when the directory is empty
    pub fn fallback() -> Self {
        Self {
            key: FALLBACK_KEY.to_string(),
            display_name: Some(format!("{} — Helpful", FALLBACK_KEY)),
            style: Some(DEFAULT_STYLE.to_string()),
            lore: Vec::new(),
            coordinator_label: None,
            voice: None,
            extra: Map::new(),
        }
    }

    /// Display name, or the key when the card has none
    pub fn name(&self) -> &str {
        non_blank(self.display_name.as_deref()).unwrap_or(&self.key)
    }

    /// Style descriptor with the default applied
    pub fn style_or_default(&self) -> &str {
        non_blank(self.style.as_deref()).unwrap_or(DEFAULT_STYLE)
    }

    /// Short name used in the system prompt: the display name before " — "
    pub fn who(&self) -> &str {
        let name = self.name();
        name.split(" — ").next().unwrap_or(name).trim()
    }

    /// `voice.greeting`, when present
    pub fn greeting_hint(&self) -> Option<&str> {
        self.voice
            .as_ref()
            .and_then(|v| v.get("greeting"))
            .and_then(Value::as_str)
            .and_then(|s| non_blank(Some(s)))
    }

    /// Label the UI shows and sends back as a selector
    ///
    /// Explicit `coordinator_label`, else `Name (Style)` split from a display
    /// name, else `Key (style)`, else the key.
    pub fn label(&self) -> String {
        if let Some(label) = non_blank(self.coordinator_label.as_deref()) {
            return label.to_string();
        }

        let style = self.style.as_deref().unwrap_or("").trim();

        if let Some(display) = self.display_name.as_deref() {
            let sep = ["—", "–", "-"].into_iter().find(|s| display.contains(s));
            if let Some((base, tail)) = sep.and_then(|s| display.split_once(s)) {
                let (base, tail) = (base.trim(), tail.trim());
                let suffix = if tail.is_empty() { style } else { tail };
                if !base.is_empty() && !suffix.is_empty() {
                    return format!("{} ({})", base, suffix);
                }
            }
        }

        if style.is_empty() {
            self.key.clone()
        } else {
            format!("{} ({})", self.key, style)
        }
    }

    /// Every string a selector may match: label, display name, key
    pub(crate) fn selector_names(&self) -> impl Iterator<Item = &str> {
        [
            self.coordinator_label.as_deref(),
            self.display_name.as_deref(),
            Some(self.key.as_str()),
        ]
        .into_iter()
        .filter_map(|s| non_blank(s))
    }
}

/// Scalar card text; numbers and booleans are rendered, anything else is absent
fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

/// `null` is no lore, a lone string is one fragment, non-text items are dropped
fn lenient_lore<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    })
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// First character upper-cased, the rest lower-cased
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn card(json: &str) -> PersonaRecord {
        PersonaRecord::from_json(json, "eeva").unwrap()
    }

    #[test]
    fn test_key_from_stem_when_missing() {
        assert_eq!(card(r#"{"style":"nerdy"}"#).key, "Eeva");
        assert_eq!(card(r#"{"key":"   "}"#).key, "Eeva");
        assert_eq!(card(r#"{"key": 7}"#).key, "Eeva");
        assert_eq!(card(r#"{"key":"Cindy"}"#).key, "Cindy");
    }

    #[test]
    fn test_capitalize_matches_title_word() {
        assert_eq!(capitalize("eEVA"), "Eeva");
        assert_eq!(capitalize("x"), "X");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(PersonaRecord::from_json("[1,2]", "eeva").is_err());
        assert!(PersonaRecord::from_json("{not json", "eeva").is_err());
    }

    #[test]
    fn test_extra_fields_are_kept() {
        let r = card(r#"{"key":"Eeva","boundaries":["no medical advice"],"behavior":{"tone":"warm"}}"#);
        assert!(r.extra.contains_key("boundaries"));
        assert!(r.extra.contains_key("behavior"));
        assert!(!r.extra.contains_key("key"));
    }

    #[test]
    fn test_odd_field_shapes_still_load() {
        assert!(card(r#"{"key":"Eeva","lore":null}"#).lore.is_empty());
        assert_eq!(card(r#"{"key":"Eeva","lore":["a",2,null,{"x":1}]}"#).lore, vec!["a", "2"]);
        assert_eq!(card(r#"{"key":"Eeva","lore":"just one"}"#).lore, vec!["just one"]);

        let odd = card(r#"{"key":"Eeva","emoji":["x","y"],"style":{"tone":"warm"},"display_name":42}"#);
        assert_eq!(odd.extra["emoji"], serde_json::json!(["x", "y"]));
        assert!(odd.style.is_none());
        assert_eq!(odd.name(), "42");
    }

    #[test]
    fn test_who_strips_style_suffix() {
        let r = card(r#"{"key":"Eeva","display_name":"Eeva — Nerdy Charming"}"#);
        assert_eq!(r.who(), "Eeva");
        assert_eq!(card(r#"{"key":"Eeva"}"#).who(), "Eeva");
    }

    #[test]
    fn test_label_rules() {
        let explicit = card(r#"{"key":"Eeva","coordinator_label":"Eeva (Nerdy)"}"#);
        assert_eq!(explicit.label(), "Eeva (Nerdy)");

        let split = card(r#"{"key":"Eeva","display_name":"Eeva – Nerdy Charming"}"#);
        assert_eq!(split.label(), "Eeva (Nerdy Charming)");

        let style_only = card(r#"{"key":"Cindy","display_name":"Cindy","style":"pragmatic"}"#);
        assert_eq!(style_only.label(), "Cindy (pragmatic)");

        let bare = card(r#"{"key":"Ada"}"#);
        assert_eq!(bare.label(), "Ada");
    }

    #[test]
    fn test_greeting_hint() {
        let r = card(r#"{"key":"Eeva","voice":{"greeting":"Hei! Graphs today?"}}"#);
        assert_eq!(r.greeting_hint(), Some("Hei! Graphs today?"));
        assert_eq!(card(r#"{"key":"Eeva","voice":"plain"}"#).greeting_hint(), None);
    }

    #[test]
    fn test_fallback_card() {
        let r = PersonaRecord::fallback();
        assert_eq!(r.key, "Persona");
        assert_eq!(r.who(), "Persona");
        assert_eq!(r.style_or_default(), "helpful & concise");
    }
}
