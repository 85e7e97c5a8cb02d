//! Canonical action fingerprints
//!
//! A fingerprint identifies a `(tool_name, params)` pair independently of
//! the order in which object keys were produced, so two suggestions that
//! differ only in key order count as the same action.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use stepwise_tools::ToolParams;

/// SHA-256 of the canonical encoding of an action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionFingerprint(String);

impl ActionFingerprint {
    /// Fingerprint a tool invocation
    #[must_use]
    pub fn of(tool_name: &str, params: &ToolParams) -> Self {
        let mut canonical = String::new();
        write_canonical(&Value::String(tool_name.to_string()), &mut canonical);
        canonical.push('|');
        write_object(params.iter(), &mut canonical);

        let digest = Sha256::digest(canonical.as_bytes());
        Self(hex::encode(digest))
    }

    /// Hex digest
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs (first 12 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ActionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical JSON text of a value: object keys sorted at every level
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map.iter(), out),
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
        // Scalars already have a unique JSON encoding
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>, out: &mut String) {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(value, out);
    }
    out.push('}');
}
