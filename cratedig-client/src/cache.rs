//! Read-through response cache with query invalidation.
//!
//! Responses of cacheable reads are stored by request key in the
//! persistent store. A hit never touches the scheduler or the network; a
//! miss acquires admission, invokes the transport (tracked), retries a
//! bounded number of times with a scheduler cool-down per failure, and
//! persists the payload on success.
//!
//! Storage failures on this path are soft: a failed read counts as a miss,
//! a failed write just loses the cache entry. Callers always get the
//! payload or the transport failure, never a storage error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cratedig_core::{
    CacheEntry, CacheQuery, CratedigError, CratedigResult, RequestCacheConfig, RequestDescriptor,
    TransportError,
};
use cratedig_storage::Store;
use serde_json::Value;

use crate::activity::ActivityTracker;
use crate::scheduler::{RateScheduler, RequestClass};
use crate::transport::CatalogTransport;

/// Activity category used for tracked transport calls.
pub const NETWORK_CATEGORY: &str = "network";

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
}

impl CacheStats {
    /// Hit rate between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct StatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Response cache for idempotent catalog reads.
///
/// Cloning is cheap; clones share the store, scheduler, tracker, and
/// statistics.
#[derive(Clone)]
pub struct RequestCache {
    store: Store,
    scheduler: Arc<RateScheduler>,
    tracker: ActivityTracker,
    config: RequestCacheConfig,
    stats: Arc<StatsInner>,
    bypass: bool,
}

impl RequestCache {
    pub fn new(
        store: Store,
        scheduler: Arc<RateScheduler>,
        tracker: ActivityTracker,
        config: RequestCacheConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            tracker,
            config,
            stats: Arc::new(StatsInner::default()),
            bypass: false,
        }
    }

    /// A view of this cache that skips cache reads and writes for its
    /// calls. Shares everything else with the original.
    pub fn bypass(&self) -> Self {
        let mut view = self.clone();
        view.bypass = true;
        view
    }

    pub fn scheduler(&self) -> &RateScheduler {
        &self.scheduler
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    /// Perform a request through the cache.
    ///
    /// Write-type requests bypass the cache entirely but still wait for
    /// scheduler admission; they are invoked exactly once. Read requests
    /// follow the read-through path described at module level.
    pub async fn get(
        &self,
        transport: &dyn CatalogTransport,
        descriptor: &RequestDescriptor,
    ) -> CratedigResult<Value> {
        let key = descriptor.cache_key();

        if !descriptor.is_cacheable() {
            self.scheduler.admit(&key, RequestClass::Write).await;
            let result = self
                .tracker
                .track(NETWORK_CATEGORY, &key, transport.perform(descriptor))
                .await;
            // write failures still cool the scheduler down, they just are
            // not retried here
            if result.is_err() {
                self.scheduler.note_failure();
            }
            return result;
        }

        let caching = self.config.enabled && !self.bypass;
        if caching {
            match self.store.get_response(&key) {
                Ok(Some(payload)) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "cache hit");
                    return Ok(payload);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss");
                }
            }
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let mut first_err: Option<CratedigError> = None;
        let attempts = self.config.retry_limit.max(1);
        for attempt in 1..=attempts {
            self.scheduler.admit(&key, RequestClass::Read).await;
            match self
                .tracker
                .track(NETWORK_CATEGORY, &key, transport.perform(descriptor))
                .await
            {
                Ok(payload) => {
                    if caching {
                        if let Err(e) = self.store.put_response(&key, &payload) {
                            tracing::warn!(key = %key, error = %e, "cache write failed");
                        }
                    }
                    return Ok(payload);
                }
                Err(e) => {
                    self.scheduler.note_failure();
                    tracing::warn!(key = %key, attempt, error = %e, "catalog fetch failed");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        tracing::error!(key = %key, attempts, "catalog fetch attempts exhausted");
        Err(first_err.unwrap_or_else(|| {
            TransportError::Network {
                target: key.clone(),
                reason: "no attempt was made".to_string(),
            }
            .into()
        }))
    }

    /// Delete every entry matching the query. The empty query clears the
    /// whole cache. Returns how many entries were removed.
    pub fn clear(&self, query: &CacheQuery) -> CratedigResult<u64> {
        let keys = self.keys(query)?;
        let removed = self.store.delete_responses(&keys)?;
        tracing::debug!(removed, "cache entries cleared");
        Ok(removed)
    }

    /// Count entries matching the query without removing them.
    pub fn count(&self, query: &CacheQuery) -> CratedigResult<u64> {
        Ok(self.keys(query)?.len() as u64)
    }

    /// Keys of entries matching the query.
    ///
    /// Key-only queries never deserialize payload bodies; payload
    /// predicates are evaluated only for entries whose key already
    /// matched.
    pub fn keys(&self, query: &CacheQuery) -> CratedigResult<Vec<String>> {
        let mut keys = Vec::new();
        for (key, raw) in self.store.response_entries()? {
            if !query.matches_key(&key) {
                continue;
            }
            if query.needs_payload() && !payload_matches(query, &raw) {
                continue;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Full entries matching the query, payloads parsed.
    pub fn entries(&self, query: &CacheQuery) -> CratedigResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for (key, raw) in self.store.response_entries()? {
            if !query.matches_key(&key) {
                continue;
            }
            if query.needs_payload() && !payload_matches(query, &raw) {
                continue;
            }
            let Ok(payload) = serde_json::from_slice(&raw) else {
                continue;
            };
            entries.push(CacheEntry { key, payload });
        }
        Ok(entries)
    }

    /// Cache effectiveness counters. A failed entry count reads as zero
    /// rather than failing the caller.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            entry_count: self.store.response_count().unwrap_or(0),
        }
    }
}

fn payload_matches(query: &CacheQuery, raw: &[u8]) -> bool {
    let Ok(raw_str) = std::str::from_utf8(raw) else {
        return false;
    };
    query.matches_payload(raw_str, || serde_json::from_slice(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cratedig_core::{SchedulerConfig, Verb};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct MockTransport {
        responses: HashMap<String, Value>,
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                failures: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_response(mut self, target: &str, payload: Value) -> Self {
            self.responses.insert(target.to_string(), payload);
            self
        }

        /// Make the next `count` calls against `target` fail.
        fn failing(self, target: &str, count: u32) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(target.to_string(), count);
            self
        }

        fn call_count(&self, key: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|k| k.as_str() == key)
                .count()
        }
    }

    #[async_trait]
    impl CatalogTransport for MockTransport {
        async fn perform(&self, descriptor: &RequestDescriptor) -> CratedigResult<Value> {
            self.calls.lock().unwrap().push(descriptor.cache_key());
            {
                let mut failures = self.failures.lock().unwrap();
                if let Some(remaining) = failures.get_mut(&descriptor.target) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(TransportError::Status {
                            target: descriptor.target.clone(),
                            status: 500,
                            message: "synthetic failure".to_string(),
                        }
                        .into());
                    }
                }
            }
            match self.responses.get(&descriptor.target) {
                Some(payload) => Ok(payload.clone()),
                None => Err(TransportError::NotFound {
                    target: descriptor.target.clone(),
                }
                .into()),
            }
        }
    }

    fn test_cache() -> (tempfile::TempDir, RequestCache) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 16).unwrap();
        let scheduler = Arc::new(RateScheduler::new(
            SchedulerConfig::new()
                .with_ceiling(100)
                .with_recheck_interval(Duration::from_millis(50))
                .with_cool_down(Duration::from_millis(200)),
        ));
        let cache = RequestCache::new(
            store,
            scheduler,
            ActivityTracker::new(),
            RequestCacheConfig::default(),
        );
        (dir, cache)
    }

    #[tokio::test]
    async fn test_hit_skips_transport() {
        let (_dir, cache) = test_cache();
        let transport = MockTransport::new().with_response("artist/5", json!({"id": 5}));
        let descriptor = RequestDescriptor::get("artist/5");

        let first = cache.get(&transport, &descriptor).await.unwrap();
        let second = cache.get(&transport, &descriptor).await.unwrap();

        assert_eq!(first, json!({"id": 5}));
        assert_eq!(second, json!({"id": 5}));
        assert_eq!(transport.call_count("artist/5"), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_write_requests_are_never_cached() {
        let (_dir, cache) = test_cache();
        let transport =
            MockTransport::new().with_response("wantlist/3", json!({"ok": true}));
        let descriptor = RequestDescriptor::new(Verb::Post, "wantlist/3");

        cache.get(&transport, &descriptor).await.unwrap();
        cache.get(&transport, &descriptor).await.unwrap();

        assert_eq!(transport.call_count("POST wantlist/3"), 2);
        assert_eq!(cache.count(&CacheQuery::all()).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_surface_original_error() {
        let (_dir, cache) = test_cache();
        let transport = MockTransport::new()
            .with_response("artist/5", json!({"id": 5}))
            .failing("artist/5", 10);
        let descriptor = RequestDescriptor::get("artist/5");

        let err = cache.get(&transport, &descriptor).await.unwrap_err();
        assert_eq!(transport.call_count("artist/5"), 3);
        assert!(matches!(
            err,
            CratedigError::Transport(TransportError::Status { status: 500, .. })
        ));
        // the failed attempts must not have poisoned the cache
        assert_eq!(cache.count(&CacheQuery::all()).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let (_dir, cache) = test_cache();
        let transport = MockTransport::new()
            .with_response("artist/5", json!({"id": 5}))
            .failing("artist/5", 2);
        let descriptor = RequestDescriptor::get("artist/5");

        let payload = cache.get(&transport, &descriptor).await.unwrap();
        assert_eq!(payload, json!({"id": 5}));
        assert_eq!(transport.call_count("artist/5"), 3);
        assert_eq!(cache.count(&CacheQuery::all()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bypass_skips_cache_both_ways() {
        let (_dir, cache) = test_cache();
        let transport = MockTransport::new().with_response("artist/5", json!({"id": 5}));
        let descriptor = RequestDescriptor::get("artist/5");

        cache.bypass().get(&transport, &descriptor).await.unwrap();
        assert_eq!(cache.count(&CacheQuery::all()).unwrap(), 0);

        // populate normally, then confirm bypass ignores the stored entry
        cache.get(&transport, &descriptor).await.unwrap();
        cache.bypass().get(&transport, &descriptor).await.unwrap();
        assert_eq!(transport.call_count("artist/5"), 3);
    }

    #[tokio::test]
    async fn test_clear_by_url_is_exact_and_idempotent() {
        let (_dir, cache) = test_cache();
        let transport = MockTransport::new()
            .with_response("artist/5", json!({"id": 5}))
            .with_response("release/9", json!({"id": 9}));

        cache
            .get(&transport, &RequestDescriptor::get("artist/5"))
            .await
            .unwrap();
        cache
            .get(&transport, &RequestDescriptor::get("release/9"))
            .await
            .unwrap();

        let query = CacheQuery::url_contains("artist/5");
        assert_eq!(cache.clear(&query).unwrap(), 1);
        assert_eq!(cache.clear(&query).unwrap(), 0); // idempotent
        assert_eq!(cache.keys(&CacheQuery::all()).unwrap(), vec!["release/9"]);
    }

    #[tokio::test]
    async fn test_clear_by_data_matches_payload_not_key() {
        let (_dir, cache) = test_cache();
        let transport = MockTransport::new()
            .with_response("artist/5", json!({"id": 5, "name": "Test"}))
            .with_response("search?q=test", json!({"results": [{"id": 5, "name": "Test"}]}))
            .with_response("artist/6", json!({"id": 6, "name": "Other"}));

        for target in ["artist/5", "search?q=test", "artist/6"] {
            cache
                .get(&transport, &RequestDescriptor::get(target))
                .await
                .unwrap();
        }

        // structural containment finds the pair at any depth
        let query = CacheQuery::data_contains_value(json!({"name": "Test"}));
        assert_eq!(cache.count(&query).unwrap(), 2);
        assert_eq!(cache.clear(&query).unwrap(), 2);
        assert_eq!(cache.keys(&CacheQuery::all()).unwrap(), vec!["artist/6"]);
    }

    #[tokio::test]
    async fn test_clear_with_both_predicates_is_intersection() {
        let (_dir, cache) = test_cache();
        let transport = MockTransport::new()
            .with_response("artist/5", json!({"name": "Test"}))
            .with_response("artist/6", json!({"name": "Test"}))
            .with_response("release/9", json!({"name": "Test"}));

        for target in ["artist/5", "artist/6", "release/9"] {
            cache
                .get(&transport, &RequestDescriptor::get(target))
                .await
                .unwrap();
        }

        let query = CacheQuery::url_contains("artist/5")
            .with_data(cratedig_core::PayloadMatch::Substring("Test".to_string()));
        assert_eq!(cache.clear(&query).unwrap(), 1);
        assert_eq!(cache.count(&CacheQuery::all()).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_entries_return_parsed_payloads() {
        let (_dir, cache) = test_cache();
        let transport = MockTransport::new().with_response("artist/5", json!({"id": 5}));
        cache
            .get(&transport, &RequestDescriptor::get("artist/5"))
            .await
            .unwrap();

        let entries = cache.entries(&CacheQuery::url_contains("artist")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "artist/5");
        assert_eq!(entries[0].payload, json!({"id": 5}));
    }

    #[tokio::test]
    async fn test_disabled_cache_always_calls_transport() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 16).unwrap();
        let scheduler = Arc::new(RateScheduler::new(
            SchedulerConfig::new().with_ceiling(100),
        ));
        let cache = RequestCache::new(
            store,
            scheduler,
            ActivityTracker::new(),
            RequestCacheConfig::new().with_enabled(false),
        );

        let transport = MockTransport::new().with_response("artist/5", json!({"id": 5}));
        let descriptor = RequestDescriptor::get("artist/5");
        cache.get(&transport, &descriptor).await.unwrap();
        cache.get(&transport, &descriptor).await.unwrap();
        assert_eq!(transport.call_count("artist/5"), 2);
        assert_eq!(cache.count(&CacheQuery::all()).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_network_calls_are_tracked() {
        let (_dir, cache) = test_cache();
        let transport = MockTransport::new().with_response("artist/5", json!({"id": 5}));
        cache
            .get(&transport, &RequestDescriptor::get("artist/5"))
            .await
            .unwrap();

        let history = cache.tracker().history(NETWORK_CATEGORY);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].detail, "artist/5");
        assert!(history[0].is_settled());
        assert!(!history[0].is_failed());
    }
}
