//! Stable cache/dedup key derived from normalized request parameters.
//! Free text is trimmed and lowercased, tech-stack categories are sorted
//! independently, and empty categories are dropped before hashing.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::request::RequestParams;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log fields.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form fed to the hasher. Field order is fixed by the struct,
/// map order by `BTreeMap`.
#[derive(Serialize)]
struct CanonicalRequest {
    text: String,
    word_limit: u32,
    selector_path: Option<String>,
    tech_stack: BTreeMap<String, Vec<String>>,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn canonicalize(params: &RequestParams) -> CanonicalRequest {
    let mut tech_stack: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (category, items) in params.tech_stack().categories() {
        let items = items.iter().map(|i| normalize(i)).filter(|i| !i.is_empty());
        tech_stack.entry(normalize(category)).or_default().extend(items);
    }
    tech_stack.retain(|_, items| !items.is_empty());
    for items in tech_stack.values_mut() {
        items.sort();
        items.dedup();
    }

    CanonicalRequest {
        text: normalize(params.text()),
        word_limit: params.word_limit().words(),
        selector_path: params
            .selector_path()
            .map(normalize)
            .filter(|s| !s.is_empty()),
        tech_stack,
    }
}

/// Compute the fingerprint of `params`. Pure and deterministic.
pub fn fingerprint(params: &RequestParams) -> Fingerprint {
    let canonical = canonicalize(params);
    // Serializing plain strings/maps cannot fail.
    let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
    Fingerprint(blake3::hash(&encoded).to_hex().to_string())
}
