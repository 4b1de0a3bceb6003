//! Cache selection queries.
//!
//! A [`CacheQuery`] is a predicate pair used to select cached responses for
//! inspection or invalidation: an optional key predicate (cheap, runs
//! against the request key) and an optional payload predicate (expensive,
//! may require deserializing candidate payloads). Both are ANDed when
//! present; the empty query matches every entry.

use regex::Regex;
use serde_json::Value;

/// One cached response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
}

/// Predicate over request keys.
#[derive(Debug, Clone)]
pub enum KeyMatch {
    /// Plain substring match against the key.
    Substring(String),
    /// Regex match against the key.
    Pattern(Regex),
}

impl KeyMatch {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatch::Substring(needle) => key.contains(needle.as_str()),
            KeyMatch::Pattern(re) => re.is_match(key),
        }
    }
}

/// Predicate over cached payloads.
#[derive(Debug, Clone)]
pub enum PayloadMatch {
    /// Substring match against the serialized payload text.
    Substring(String),
    /// Structural containment test against the parsed payload.
    Contains(Value),
}

impl PayloadMatch {
    /// Evaluate against the serialized payload and a lazily parsed value.
    ///
    /// `raw` is the payload exactly as stored; `parsed` is only consulted
    /// for structural containment so substring queries never pay the parse.
    pub fn matches(&self, raw: &str, parsed: impl FnOnce() -> Option<Value>) -> bool {
        match self {
            PayloadMatch::Substring(needle) => raw.contains(needle.as_str()),
            PayloadMatch::Contains(needle) => match parsed() {
                Some(value) => json_contains(&value, needle),
                None => false,
            },
        }
    }
}

/// Predicate pair selecting cache entries by key and/or payload content.
#[derive(Debug, Clone, Default)]
pub struct CacheQuery {
    pub url: Option<KeyMatch>,
    pub data: Option<PayloadMatch>,
}

impl CacheQuery {
    /// The match-everything query.
    pub fn all() -> Self {
        Self::default()
    }

    /// Select entries whose key contains `needle`.
    pub fn url_contains(needle: impl Into<String>) -> Self {
        Self {
            url: Some(KeyMatch::Substring(needle.into())),
            data: None,
        }
    }

    /// Select entries whose key matches `pattern`.
    pub fn url_matches(pattern: Regex) -> Self {
        Self {
            url: Some(KeyMatch::Pattern(pattern)),
            data: None,
        }
    }

    /// Select entries whose serialized payload contains `needle`.
    pub fn data_contains(needle: impl Into<String>) -> Self {
        Self {
            url: None,
            data: Some(PayloadMatch::Substring(needle.into())),
        }
    }

    /// Select entries whose parsed payload structurally contains `needle`.
    pub fn data_contains_value(needle: Value) -> Self {
        Self {
            url: None,
            data: Some(PayloadMatch::Contains(needle)),
        }
    }

    /// Add a key predicate to an existing query.
    pub fn with_url(mut self, m: KeyMatch) -> Self {
        self.url = Some(m);
        self
    }

    /// Add a payload predicate to an existing query.
    pub fn with_data(mut self, m: PayloadMatch) -> Self {
        self.data = Some(m);
        self
    }

    /// True when evaluating this query requires looking at payloads at all.
    pub fn needs_payload(&self) -> bool {
        self.data.is_some()
    }

    pub fn matches_key(&self, key: &str) -> bool {
        self.url.as_ref().map_or(true, |m| m.matches(key))
    }

    pub fn matches_payload(&self, raw: &str, parsed: impl FnOnce() -> Option<Value>) -> bool {
        self.data.as_ref().map_or(true, |m| m.matches(raw, parsed))
    }
}

/// Structural containment test for JSON values.
///
/// `needle` is contained in `haystack` when it matches at the root
/// (objects: every needle key matches recursively; arrays: every needle
/// element is contained in some haystack element; scalars: equality) or at
/// any nested value of the haystack. `{"id": 5}` therefore selects any
/// payload carrying that pair at any depth.
pub fn json_contains(haystack: &Value, needle: &Value) -> bool {
    if contains_at(haystack, needle) {
        return true;
    }
    match haystack {
        Value::Object(map) => map.values().any(|v| json_contains(v, needle)),
        Value::Array(items) => items.iter().any(|v| json_contains(v, needle)),
        _ => false,
    }
}

/// Containment anchored at one node, no descent into the haystack.
fn contains_at(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, nv)| h.get(k).is_some_and(|hv| contains_at(hv, nv))),
        (Value::Array(h), Value::Array(n)) => {
            n.iter().all(|nv| h.iter().any(|hv| contains_at(hv, nv)))
        }
        (h, n) => h == n,
    }
}
