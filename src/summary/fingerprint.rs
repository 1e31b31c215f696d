//! Persona fingerprints
//!
//! SHA-256 over a canonical JSON rendering of the card (object keys sorted at
//! every depth, compact separators) with cosmetic fields removed.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::persona::PersonaRecord;

/// Card fields that never invalidate a cached summary
pub const EXCLUDED_FIELDS: &[&str] = &["emoji", "image", "avatar", "logo", "bg"];

/// Hex fingerprint of the load-bearing content of `record`
pub fn fingerprint(record: &PersonaRecord) -> String {
    let canonical = canonical_json(&load_bearing(record));
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// The card as a JSON object, minus excluded fields
fn load_bearing(record: &PersonaRecord) -> Value {
    let mut card: Map<String, Value> = record.extra.clone();

    card.insert("key".to_string(), Value::String(record.key.clone()));
    if let Some(ref name) = record.display_name {
        card.insert("display_name".to_string(), Value::String(name.clone()));
    }
    if let Some(ref style) = record.style {
        card.insert("style".to_string(), Value::String(style.clone()));
    }
    if !record.lore.is_empty() {
        let lore = record.lore.iter().cloned().map(Value::String).collect();
        card.insert("lore".to_string(), Value::Array(lore));
    }
    if let Some(ref label) = record.coordinator_label {
        card.insert("coordinator_label".to_string(), Value::String(label.clone()));
    }
    if let Some(ref voice) = record.voice {
        card.insert("voice".to_string(), voice.clone());
    }

    card.retain(|field, _| !EXCLUDED_FIELDS.contains(&field.as_str()));
    Value::Object(card)
}

/// Compact JSON with object keys sorted
///
/// Does not rely on `serde_json::Map` ordering, which changes when the
/// `preserve_order` feature is enabled anywhere in the build.
fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
