//! Content canonicalization and content-addressed pattern ids.
//!
//! A pattern's id is derived from `(pattern_type, canonical content)` so that
//! semantically identical patterns learned by independent instances collide
//! to the same identity. The canonical form is the content's identity fields
//! rendered as JSON with:
//!
//! - object keys in sorted order (serde_json's default map ordering),
//! - strings trimmed, internal whitespace collapsed to single spaces,
//!   and lowercased,
//! - arrays kept in their given order.
//!
//! The id is `"pat-"` followed by the first 16 hex characters of
//! `SHA-256(type_tag "\n" canonical_json)`. Any change to this algorithm
//! changes every id and silently breaks merge matching across instances,
//! so treat it as a wire format.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{PatternContent, PatternId};

/// Number of hex characters of the digest kept in the id.
const ID_HEX_LEN: usize = 16;

/// Derive the content-addressed id for a pattern's content.
pub fn pattern_id(content: &PatternContent) -> PatternId {
    let canon = canonical_json(&content.identity_value());

    let mut hasher = Sha256::new();
    hasher.update(content.pattern_type().as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(canon.as_bytes());
    let digest = hex::encode(hasher.finalize());

    PatternId(format!("pat-{}", &digest[..ID_HEX_LEN]))
}

/// Render a JSON value in canonical form: normalized strings, sorted keys.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&normalize_value(value))
        .expect("a JSON value always serializes")
}

/// Normalize free text: trim, collapse runs of whitespace, lowercase.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::WorkflowContent;
    use std::collections::BTreeMap;

    fn workflow(name: &str, steps: &[&str]) -> PatternContent {
        PatternContent::Workflow(WorkflowContent {
            name: name.to_string(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
            trigger: None,
            extra: BTreeMap::new(),
        })
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Run   the\tTests \n"), "run the tests");
        assert_eq!(normalize_text("already normal"), "already normal");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_id_is_stable() {
        let a = pattern_id(&workflow("TDD loop", &["red", "green", "refactor"]));
        let b = pattern_id(&workflow("TDD loop", &["red", "green", "refactor"]));
        assert_eq!(a, b);
        assert!(a.0.starts_with("pat-"));
        assert_eq!(a.0.len(), 4 + ID_HEX_LEN);
    }

    #[test]
    fn test_whitespace_and_case_collide() {
        let a = pattern_id(&workflow("TDD Loop", &["Red", "Green"]));
        let b = pattern_id(&workflow("  tdd   loop ", &["red", "green"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_content_differs() {
        let a = pattern_id(&workflow("tdd loop", &["red", "green"]));
        let b = pattern_id(&workflow("tdd loop", &["green", "red"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_extra_fields_do_not_change_id() {
        let plain = workflow("deploy", &["build", "ship"]);
        let mut with_extra = plain.clone();
        if let PatternContent::Workflow(w) = &mut with_extra {
            w.extra
                .insert("observed_in".to_string(), serde_json::json!("ci"));
        }
        assert_eq!(pattern_id(&plain), pattern_id(&with_extra));
    }
}
