//! cratedig Storage - Persistent Store
//!
//! LMDB-backed (heed) durable key/value substrate for the response cache
//! and the entity stores. One environment holds every named database; the
//! [`Store`] handle is cheaply cloneable and shared so all components use
//! the same lazily-opened connection rather than opening their own.
//!
//! # Databases
//!
//! - `responses`: request key → JSON payload bytes
//! - `artists` (+ `artists_by_name`): artist id → record
//! - `releases` (+ `releases_by_master`, `releases_by_year`): release id → record
//! - `artist_roles` (+ `roles_by_artist`, `roles_by_release`, `roles_by_role`):
//!   composite join id → row
//! - `meta`: store-level schema version
//!
//! # Schema evolution
//!
//! Databases are created lazily inside the bootstrap transaction, so a
//! store written by an older version gains missing databases on open
//! (additive migration). Stores written by a newer version are refused.

mod catalog;
mod responses;
mod store;

pub use store::{Store, STORE_VERSION};
