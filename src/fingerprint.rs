//! Structural response fingerprints.
//!
//! A fingerprint captures the *shape* of a response rather than its values:
//! status code plus the key layout of the JSON body. Two responses with the
//! same keys but different numbers hash identically, while a renamed field or
//! a new status code does not.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Placeholder rendered for scalars and empty arrays.
const SCALAR: &str = "\"value\"";

/// 128-bit opaque comparison token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Fingerprint a response from its status code and raw body bytes.
///
/// JSON bodies are reduced to their shape; anything else falls back to the
/// body length so that at least gross changes are noticed.
pub fn fingerprint(status: u16, body: &[u8]) -> Fingerprint {
    let signed = match serde_json::from_slice::<Value>(body) {
        Ok(value) => format!("{}:{}", status, shape(&value)),
        Err(_) => format!("{}:{}", status, body.len()),
    };

    let digest = Sha256::digest(signed.as_bytes());
    let mut truncated = [0u8; 16];
    truncated.copy_from_slice(&digest[..16]);
    Fingerprint(truncated)
}

/// Render the structural shape of a JSON value.
///
/// Objects list their keys in sorted order; arrays are sampled by their first
/// element only.
pub fn shape(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{}:{}", key, shape(&map[key.as_str()])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => match items.first() {
            Some(first) => format!("[{}]", shape(first)),
            None => SCALAR.to_string(),
        },
        _ => SCALAR.to_string(),
    }
}
