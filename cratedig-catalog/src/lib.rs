//! cratedig Catalog - Entity Store
//!
//! Typed, identity-addressed records (artists, releases, artist/role join
//! rows) that hydrate from the persistent store, refresh over the network
//! when absent or stale, and persist on every refresh.
//!
//! Entities surface as [`RemoteResource`]s: explicit pending/ready/error
//! status with a subscription channel and a repeatable `refresh`, so UI
//! code can render loading and error states and wire manual retry without
//! knowing anything about the fetch path.

pub mod repository;
pub mod resource;

pub use repository::CatalogStore;
pub use resource::{DerivedResource, LoadFuture, RemoteResource, ResourceState};
