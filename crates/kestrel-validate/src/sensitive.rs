//! Advisory scan for secret-looking keys.
//!
//! Walks a parsed JSON value and flags keys whose lowercase form contains a
//! sensitive term. Findings are warnings only — the scan never blocks a call.

use serde_json::Value;

use crate::types::{ValidationWarning, codes};

/// Terms that mark a key as potentially carrying a secret.
const SENSITIVE_TERMS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "private_key",
    "access_key",
    "auth",
];

/// Recursively scan `value`, reporting one warning per sensitive key.
///
/// `field_prefix` seeds the reported paths (e.g. `arguments`).
#[must_use]
pub fn scan_sensitive_keys(value: &Value, field_prefix: &str) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    scan(value, field_prefix, &mut warnings);
    warnings
}

fn scan(value: &Value, path: &str, warnings: &mut Vec<ValidationWarning>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                if is_sensitive_key(key) {
                    warnings.push(ValidationWarning::new(
                        child_path.clone(),
                        codes::SENSITIVE_KEY,
                        format!("field name '{key}' looks like it carries a secret"),
                    ));
                }
                scan(child, &child_path, warnings);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan(item, &format!("{path}[{i}]"), warnings);
            }
        }
        _ => {}
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_TERMS.iter().any(|term| lower.contains(term))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
