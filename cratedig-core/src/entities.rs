//! Catalog entity records.
//!
//! These are the normalized, persisted domain objects. They carry no
//! behavior beyond derived accessors; all mutation flows through the
//! repositories in `cratedig-catalog` so the persistence path stays in one
//! place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::ids::{ArtistId, ArtistRoleId, MasterId, ReleaseId};

/// Current record schema version.
///
/// Persisted releases stamped with an older version are stale: they are
/// refreshed from the network instead of being served as-is.
pub const SCHEMA_VERSION: u32 = 2;

/// An artist as known to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
    /// Free-text biography from the remote catalog.
    pub profile: String,
    /// Full-size image URLs.
    pub images: Vec<String>,
    /// The request target that produced this record. Lets callers
    /// invalidate the backing response without knowing storage keys.
    pub cache_identity: String,
}

/// One credited artist on a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCredit {
    pub artist_id: ArtistId,
    pub name: String,
    pub role: String,
}

/// A release (a concrete pressing/edition) as known to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub title: String,
    pub master_id: Option<MasterId>,
    pub year: Option<i32>,
    /// Credited artists, main and extra, in catalog order.
    pub artist_roles: Vec<ArtistCredit>,
    pub images: Vec<String>,
    pub thumbnail: String,
    pub rating: f32,
    pub rating_count: u32,
    pub total_duration_seconds: u32,
    pub schema_version: u32,
}

impl Release {
    /// True when this record predates the current schema and must be
    /// refreshed rather than trusted.
    pub fn is_stale(&self) -> bool {
        self.schema_version < SCHEMA_VERSION
    }

    /// Materialize the join rows implied by the current credit list.
    ///
    /// Duplicate (artist, role) pairs collapse onto the same composite id,
    /// so the returned rows may be fewer than the credits.
    pub fn artist_role_rows(&self) -> Vec<ArtistRole> {
        let mut rows: Vec<ArtistRole> = Vec::with_capacity(self.artist_roles.len());
        for credit in &self.artist_roles {
            let id = ArtistRoleId::new(credit.artist_id, self.id, &credit.role);
            if rows.iter().any(|r| r.id == id) {
                continue;
            }
            rows.push(ArtistRole {
                id,
                artist_id: credit.artist_id,
                release_id: self.id,
                role: credit.role.clone(),
            });
        }
        rows
    }
}

/// Join row relating an artist to a release under a specific role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRole {
    pub id: ArtistRoleId,
    pub artist_id: ArtistId,
    pub release_id: ReleaseId,
    pub role: String,
}

/// One tracked asynchronous operation.
///
/// Created when the operation starts, sealed exactly once when it settles,
/// and pruned after a retention window. Owned exclusively by the activity
/// tracker; everything else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub category: String,
    pub detail: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ActivityRecord {
    /// Begin a new record with a fresh v7 id.
    pub fn begin(category: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            category: category.into(),
            detail: detail.into(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// True once the operation has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        self.finished_at.is_some()
    }

    /// True when the operation settled with an error.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Wall-clock duration, if settled.
    pub fn duration(&self) -> Option<Duration> {
        self.finished_at.map(|end| {
            end.signed_duration_since(self.started_at)
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release_with_credits(credits: Vec<ArtistCredit>) -> Release {
        Release {
            id: ReleaseId(10),
            title: "Test Release".to_string(),
            master_id: None,
            year: Some(1977),
            artist_roles: credits,
            images: vec![],
            thumbnail: String::new(),
            rating: 0.0,
            rating_count: 0,
            total_duration_seconds: 0,
            schema_version: SCHEMA_VERSION,
        }
    }

    #[test]
    fn test_artist_role_rows_one_per_credit() {
        let release = release_with_credits(vec![
            ArtistCredit {
                artist_id: ArtistId(1),
                name: "A".to_string(),
                role: "Main".to_string(),
            },
            ArtistCredit {
                artist_id: ArtistId(2),
                name: "B".to_string(),
                role: "Producer".to_string(),
            },
        ]);

        let rows = release.artist_role_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id.as_str(), "1-10-Main");
        assert_eq!(rows[1].id.as_str(), "2-10-Producer");
        assert!(rows.iter().all(|r| r.release_id == ReleaseId(10)));
    }

    #[test]
    fn test_artist_role_rows_dedupe_identical_credits() {
        let credit = ArtistCredit {
            artist_id: ArtistId(1),
            name: "A".to_string(),
            role: "Main".to_string(),
        };
        let release = release_with_credits(vec![credit.clone(), credit]);
        assert_eq!(release.artist_role_rows().len(), 1);
    }

    #[test]
    fn test_release_staleness() {
        let mut release = release_with_credits(vec![]);
        assert!(!release.is_stale());
        release.schema_version = SCHEMA_VERSION - 1;
        assert!(release.is_stale());
    }

    #[test]
    fn test_activity_record_lifecycle() {
        let mut record = ActivityRecord::begin("network", "artist/5");
        assert!(!record.is_settled());
        assert!(!record.is_failed());
        assert_eq!(record.duration(), None);

        record.finished_at = Some(Utc::now());
        record.error = Some("boom".to_string());
        assert!(record.is_settled());
        assert!(record.is_failed());
        assert!(record.duration().is_some());
    }
}
