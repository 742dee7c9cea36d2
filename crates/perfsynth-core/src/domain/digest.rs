//! Content-addressed request keys.
//!
//! A request digest is SHA-256 over the canonical JSON of
//! `(character_id, character version, instruction set)`. Object keys are
//! sorted and integer-valued floats are written as integers, so two
//! semantically equal requests hash identically regardless of field order.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::character::CharacterModel;
use super::instructions::PerformanceInstructionSet;

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) if !(n.is_i64() || n.is_u64()) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Value::Number(serde_json::Number::from(f as i64))
            }
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Canonical compact JSON for any serializable value.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let raw = serde_json::to_value(value)?;
    serde_json::to_string(&canonicalize(&raw))
}

/// Hex SHA-256 of the canonical JSON form of `value`.
pub fn compute_digest<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Serialize)]
struct RequestKey<'a> {
    character_id: &'a str,
    character_version: u32,
    instructions: &'a PerformanceInstructionSet,
}

/// Cache key for a synthesis request.
pub fn request_digest(
    character: &CharacterModel,
    instructions: &PerformanceInstructionSet,
) -> Result<String, serde_json::Error> {
    compute_digest(&RequestKey {
        character_id: &character.character_id,
        character_version: character.version,
        instructions,
    })
}
