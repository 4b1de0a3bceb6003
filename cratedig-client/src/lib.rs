//! cratedig Client - Request Plumbing
//!
//! Everything between "the UI wants a document" and "bytes went over the
//! wire": the read-through response cache with query invalidation, the
//! rate scheduler that keeps the process inside the remote's limits, the
//! activity tracker for observability, and the transport contract with its
//! HTTP implementation.
//!
//! # Control flow
//!
//! ```text
//! RequestCache::get
//!   ├─ cache hit ──────────────────────────→ payload (no scheduler, no network)
//!   └─ miss → RateScheduler::admit (may suspend)
//!               └─ CatalogTransport::perform, tracked by ActivityTracker
//!                     ├─ ok  → persist + payload
//!                     └─ err → scheduler cool-down, retry (bounded)
//! ```

pub mod activity;
pub mod cache;
pub mod scheduler;
pub mod transport;

pub use activity::{ActivityEvent, ActivityTracker};
pub use cache::{CacheStats, RequestCache, NETWORK_CATEGORY};
pub use scheduler::{RateScheduler, RequestClass};
pub use transport::{CatalogTransport, HttpTransport};
