//! Request descriptors and cache key derivation.
//!
//! A [`RequestDescriptor`] carries exactly the information the cache needs
//! to derive a stable key: the verb and the request target. Only `GET`
//! requests are cacheable; write verbs still pass through the scheduler but
//! never touch the cache.

use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP-shaped request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    /// Uppercase wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }

    /// True for idempotent read verbs.
    pub fn is_read(&self) -> bool {
        matches!(self, Verb::Get)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one remote catalog request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub verb: Verb,
    /// Path relative to the catalog base URL, e.g. `"artist/5"`.
    pub target: String,
}

impl RequestDescriptor {
    pub fn new(verb: Verb, target: impl Into<String>) -> Self {
        Self {
            verb,
            target: target.into(),
        }
    }

    /// Shorthand for a cacheable read request.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Verb::Get, target)
    }

    /// Stable cache key for this request.
    ///
    /// Reads key on the target alone so the common case stays directly
    /// matchable by URL queries; write verbs prepend the verb so a `POST`
    /// and a `DELETE` against the same target can never alias.
    pub fn cache_key(&self) -> String {
        if self.verb.is_read() {
            self.target.clone()
        } else {
            format!("{} {}", self.verb, self.target)
        }
    }

    /// True when responses to this request may be cached.
    pub fn is_cacheable(&self) -> bool {
        self.verb.is_read()
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.target)
    }
}
