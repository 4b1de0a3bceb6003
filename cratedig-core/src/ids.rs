//! Identity types for catalog entities.
//!
//! Catalog ids are numeric identifiers assigned by the remote API. The
//! newtypes keep artist, release, and master ids from being mixed up at
//! compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric artist identifier assigned by the remote catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ArtistId(pub u64);

/// Numeric release identifier assigned by the remote catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReleaseId(pub u64);

/// Numeric master-release identifier. Masters live in a separate id
/// namespace from releases.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MasterId(pub u64);

impl fmt::Display for ArtistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite identifier for an artist/role join row.
///
/// Format: `"{artist_id}-{release_id}-{role}"`. The formatting here is the
/// single source of join-row identity; every component that needs to key a
/// role row goes through [`ArtistRoleId::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtistRoleId(String);

impl ArtistRoleId {
    /// Build the composite id for an (artist, release, role) triple.
    pub fn new(artist: ArtistId, release: ReleaseId, role: &str) -> Self {
        Self(format!("{}-{}-{}", artist, release, role))
    }

    /// The composite id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtistRoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
