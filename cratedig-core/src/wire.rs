//! Wire payload types for the remote catalog API.
//!
//! These mirror the JSON the catalog returns; the `into_*` mappings produce
//! the normalized entity records. Wire types stay separate from entities so
//! remote schema drift never leaks into persisted data.

use serde::{Deserialize, Serialize};

use crate::entities::{Artist, ArtistCredit, Release, SCHEMA_VERSION};
use crate::ids::{ArtistId, MasterId, ReleaseId};

/// Artist document as returned by `artist/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistPayload {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

/// Release document as returned by `release/{id}` and `master/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasePayload {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub master_id: Option<u64>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub artists: Vec<CreditPayload>,
    #[serde(default)]
    pub extraartists: Vec<CreditPayload>,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
    #[serde(default)]
    pub thumb: String,
    #[serde(default)]
    pub community: Option<CommunityPayload>,
    #[serde(default)]
    pub tracklist: Vec<TrackPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPayload {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub uri150: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityPayload {
    #[serde(default)]
    pub rating: Option<RatingPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingPayload {
    #[serde(default)]
    pub average: f32,
    #[serde(default)]
    pub count: u32,
}

/// Role assigned to credits listed without one (the main `artists` block).
pub const MAIN_ROLE: &str = "Main";

/// Parse a catalog track duration (`"M:SS"` or `"H:MM:SS"`) into seconds.
///
/// Anything unparseable contributes 0; the catalog leaves durations blank
/// for untimed tracks.
pub fn parse_duration_seconds(duration: &str) -> u32 {
    let trimmed = duration.trim();
    if trimmed.is_empty() {
        return 0;
    }
    let mut total: u64 = 0;
    for part in trimmed.split(':') {
        match part.trim().parse::<u64>() {
            Ok(n) => total = total * 60 + n,
            Err(_) => return 0,
        }
    }
    total.min(u32::MAX as u64) as u32
}

impl ArtistPayload {
    /// Map into the normalized artist record.
    ///
    /// `cache_identity` is the request target the document came from; it is
    /// persisted so callers can invalidate the backing response later.
    pub fn into_artist(self, cache_identity: impl Into<String>) -> Artist {
        Artist {
            id: ArtistId(self.id),
            name: self.name,
            profile: self.profile,
            images: self.images.into_iter().map(|i| i.uri).collect(),
            cache_identity: cache_identity.into(),
        }
    }
}

impl ReleasePayload {
    /// Map into the normalized release record, stamped with the current
    /// schema version.
    pub fn into_release(self) -> Release {
        let mut credits: Vec<ArtistCredit> = Vec::new();
        for c in self.artists {
            credits.push(ArtistCredit {
                artist_id: ArtistId(c.id),
                name: c.name,
                role: if c.role.is_empty() {
                    MAIN_ROLE.to_string()
                } else {
                    c.role
                },
            });
        }
        for c in self.extraartists {
            credits.push(ArtistCredit {
                artist_id: ArtistId(c.id),
                name: c.name,
                role: if c.role.is_empty() {
                    MAIN_ROLE.to_string()
                } else {
                    c.role
                },
            });
        }

        let total_duration_seconds = self
            .tracklist
            .iter()
            .map(|t| parse_duration_seconds(&t.duration))
            .sum();

        let (rating, rating_count) = match self.community.and_then(|c| c.rating) {
            Some(r) => (r.average, r.count),
            None => (0.0, 0),
        };

        Release {
            id: ReleaseId(self.id),
            title: self.title,
            master_id: self.master_id.map(MasterId),
            year: self.year,
            artist_roles: credits,
            images: self.images.into_iter().map(|i| i.uri).collect(),
            thumbnail: self.thumb,
            rating,
            rating_count,
            total_duration_seconds,
            schema_version: SCHEMA_VERSION,
        }
    }
}
