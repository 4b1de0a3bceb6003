//! cratedig Core - Entity and Protocol Types
//!
//! Pure data structures shared by every other crate: entity records, wire
//! payloads, request descriptors, cache queries, configuration, and the
//! error taxonomy. This crate contains no I/O.

pub mod config;
pub mod entities;
pub mod error;
pub mod ids;
pub mod query;
pub mod request;
pub mod wire;

pub use config::{RequestCacheConfig, SchedulerConfig, TransportConfig};
pub use entities::{
    ActivityRecord, Artist, ArtistCredit, ArtistRole, Release, SCHEMA_VERSION,
};
pub use error::{
    CatalogError, CratedigError, CratedigResult, StorageError, TransportError,
};
pub use ids::{ArtistId, ArtistRoleId, MasterId, ReleaseId};
pub use query::{CacheEntry, CacheQuery, KeyMatch, PayloadMatch, json_contains};
pub use request::{RequestDescriptor, Verb};
