//! End-to-end flows through cache, scheduler, storage, and entity store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cratedig_catalog::{CatalogStore, RemoteResource, ResourceState};
use cratedig_client::{ActivityTracker, CatalogTransport, RateScheduler, RequestCache};
use cratedig_core::{
    ArtistId, CacheQuery, CratedigResult, ReleaseId, RequestCacheConfig, RequestDescriptor,
    SchedulerConfig, TransportError, SCHEMA_VERSION,
};
use cratedig_storage::Store;
use serde_json::{json, Value};

struct MockTransport {
    responses: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn insert(&self, target: &str, payload: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(target.to_string(), payload);
    }

    fn calls_for(&self, target: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == target)
            .count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogTransport for MockTransport {
    async fn perform(&self, descriptor: &RequestDescriptor) -> CratedigResult<Value> {
        self.calls.lock().unwrap().push(descriptor.target.clone());
        match self.responses.lock().unwrap().get(&descriptor.target) {
            Some(payload) => Ok(payload.clone()),
            None => Err(TransportError::NotFound {
                target: descriptor.target.clone(),
            }
            .into()),
        }
    }
}

fn open_store(dir: &tempfile::TempDir) -> Store {
    Store::open(dir.path(), 16).unwrap()
}

/// Build a catalog store over a shared store handle, as a fresh process
/// would: empty in-memory maps, its own scheduler and tracker.
fn catalog_over(store: &Store, transport: Arc<MockTransport>) -> CatalogStore {
    let scheduler = Arc::new(RateScheduler::new(
        SchedulerConfig::new()
            .with_ceiling(100)
            .with_recheck_interval(Duration::from_millis(20))
            .with_cool_down(Duration::from_millis(100)),
    ));
    let cache = RequestCache::new(
        store.clone(),
        scheduler,
        ActivityTracker::new(),
        RequestCacheConfig::default(),
    );
    CatalogStore::new(store.clone(), cache, transport)
}

async fn settled<T: Clone + Send + Sync + 'static>(
    resource: &RemoteResource<T>,
) -> ResourceState<T> {
    let mut rx = resource.subscribe();
    let wait = async {
        loop {
            let state = rx.borrow_and_update().clone();
            if !state.is_pending() {
                return state;
            }
            rx.changed().await.unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("resource did not settle")
}

async fn settled_derived<T: Clone + Send + Sync + 'static>(
    resource: &cratedig_catalog::DerivedResource<T>,
) -> ResourceState<T> {
    let mut rx = resource.subscribe();
    let wait = async {
        loop {
            let state = rx.borrow_and_update().clone();
            if !state.is_pending() {
                return state;
            }
            rx.changed().await.unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("derived resource did not settle")
}

fn artist_doc(id: u64, name: &str) -> Value {
    json!({"id": id, "name": name, "profile": "", "images": []})
}

fn release_doc(id: u64, master: Option<u64>) -> Value {
    json!({
        "id": id,
        "title": format!("Release {id}"),
        "master_id": master,
        "year": 1977,
        "artists": [{"id": 5, "name": "Test", "role": ""}],
        "extraartists": [{"id": 6, "name": "Twiddler", "role": "Producer"}],
        "thumb": "http://img/t.jpg",
        "community": {"rating": {"average": 4.5, "count": 12}},
        "tracklist": [{"title": "One", "duration": "3:45"}]
    })
}

#[tokio::test]
async fn test_artist_fetch_cache_and_invalidation_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let transport = MockTransport::new();
    transport.insert("artist/5", artist_doc(5, "Test"));
    let catalog = catalog_over(&store, Arc::clone(&transport));

    // never cached before: one admission, one fetch, entity becomes ready
    let resource = catalog.artist(ArtistId(5));
    let state = settled(&resource).await;
    assert_eq!(state.value().unwrap().name, "Test");
    assert_eq!(transport.calls_for("artist/5"), 1);

    // the response cache now holds exactly the artist entry
    assert_eq!(
        catalog.cache().keys(&CacheQuery::all()).unwrap(),
        vec!["artist/5"]
    );

    // clearing by URL empties it; the next read misses and re-fetches
    assert_eq!(
        catalog.invalidate(&CacheQuery::url_contains("artist/5")).unwrap(),
        1
    );
    assert_eq!(catalog.cache().count(&CacheQuery::all()).unwrap(), 0);

    catalog
        .cache()
        .get(transport.as_ref() as &dyn CatalogTransport, &RequestDescriptor::get("artist/5"))
        .await
        .unwrap();
    assert_eq!(transport.calls_for("artist/5"), 2);
}

#[tokio::test]
async fn test_resources_are_memoized_per_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let transport = MockTransport::new();
    transport.insert("artist/5", artist_doc(5, "Test"));
    let catalog = catalog_over(&store, Arc::clone(&transport));

    let first = catalog.artist(ArtistId(5));
    let second = catalog.artist(ArtistId(5));
    assert!(Arc::ptr_eq(&first, &second));

    settled(&first).await;
    // both handles observe the same settled state; only one fetch happened
    assert!(second.state().is_ready());
    assert_eq!(transport.calls_for("artist/5"), 1);
}

#[tokio::test]
async fn test_release_persists_entity_and_join_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let transport = MockTransport::new();
    transport.insert("release/10", release_doc(10, Some(99)));
    let catalog = catalog_over(&store, Arc::clone(&transport));

    let resource = catalog.release(ReleaseId(10));
    let state = settled(&resource).await;
    let release = state.value().unwrap();
    assert_eq!(release.title, "Release 10");
    assert_eq!(release.total_duration_seconds, 225);
    assert_eq!(release.schema_version, SCHEMA_VERSION);

    // the persisted join rows reflect the credit list
    let roles = catalog.roles_for_release(ReleaseId(10)).unwrap();
    assert_eq!(roles.len(), 2);
    let producer = catalog.roles_for_artist(ArtistId(6)).unwrap();
    assert_eq!(producer.len(), 1);
    assert_eq!(producer[0].role, "Producer");
}

#[tokio::test]
async fn test_persisted_release_hydrates_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    {
        let transport = MockTransport::new();
        transport.insert("release/10", release_doc(10, None));
        let catalog = catalog_over(&store, Arc::clone(&transport));
        settled(&catalog.release(ReleaseId(10))).await;
    }

    // fresh process over the same store, remote unreachable
    let offline = MockTransport::new();
    let catalog = catalog_over(&store, Arc::clone(&offline));
    let state = settled(&catalog.release(ReleaseId(10))).await;
    assert_eq!(state.value().unwrap().title, "Release 10");
    assert_eq!(offline.total_calls(), 0);
}

#[tokio::test]
async fn test_stale_schema_triggers_refresh_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    // persist a record predating the current schema
    {
        let transport = MockTransport::new();
        transport.insert("release/10", release_doc(10, None));
        let catalog = catalog_over(&store, Arc::clone(&transport));
        settled(&catalog.release(ReleaseId(10))).await;

        let mut stored = store.get_release(ReleaseId(10)).unwrap().unwrap();
        stored.schema_version = SCHEMA_VERSION - 1;
        store.put_release_with_roles(&stored).unwrap();
    }

    let transport = MockTransport::new();
    transport.insert("release/10", release_doc(10, None));
    let catalog = catalog_over(&store, Arc::clone(&transport));

    // the stale record is refreshed silently, never surfaced as an error
    let state = settled(&catalog.release(ReleaseId(10))).await;
    assert!(state.is_ready());
    assert_eq!(transport.calls_for("release/10"), 1);
    assert_eq!(
        catalog
            .store()
            .get_release(ReleaseId(10))
            .unwrap()
            .unwrap()
            .schema_version,
        SCHEMA_VERSION
    );
}

#[tokio::test]
async fn test_missing_artist_settles_into_error_with_manual_retry() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let transport = MockTransport::new();
    let catalog = catalog_over(&store, Arc::clone(&transport));

    let resource = catalog.artist(ArtistId(404));
    let state = settled(&resource).await;
    assert!(state.is_error());
    assert!(state.error_message().unwrap().contains("artist/404"));

    // the record appears remotely; a manual refresh recovers
    transport.insert("artist/404", artist_doc(404, "Late Arrival"));
    resource.refresh().await;
    let state = settled(&resource).await;
    assert_eq!(state.value().unwrap().name, "Late Arrival");
}

#[tokio::test]
async fn test_master_of_follows_upstream_release() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let transport = MockTransport::new();
    transport.insert("release/10", release_doc(10, Some(99)));
    transport.insert("master/99", {
        json!({"id": 99, "title": "The Master", "year": 1975})
    });
    let catalog = catalog_over(&store, Arc::clone(&transport));

    let derived = catalog.master_of(ReleaseId(10));
    let state = settled_derived(&derived).await;
    assert_eq!(state.value().unwrap().title, "The Master");

    // the derived resource itself never fetched the release document twice
    assert_eq!(transport.calls_for("release/10"), 1);
    assert_eq!(transport.calls_for("master/99"), 1);
}

#[tokio::test]
async fn test_master_of_release_without_master_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let transport = MockTransport::new();
    transport.insert("release/11", release_doc(11, None));
    let catalog = catalog_over(&store, Arc::clone(&transport));

    let derived = catalog.master_of(ReleaseId(11));
    let state = settled_derived(&derived).await;
    assert!(state.is_error());
    assert!(state.error_message().unwrap().contains("no master"));
}

#[tokio::test]
async fn test_load_all_warms_from_store_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    {
        let transport = MockTransport::new();
        transport.insert("artist/5", artist_doc(5, "Test"));
        transport.insert("release/10", release_doc(10, None));
        let catalog = catalog_over(&store, Arc::clone(&transport));
        settled(&catalog.artist(ArtistId(5))).await;
        settled(&catalog.release(ReleaseId(10))).await;
    }

    let offline = MockTransport::new();
    let catalog = catalog_over(&store, Arc::clone(&offline));
    catalog.load_all().await.unwrap();
    catalog.load_all().await.unwrap(); // idempotent

    let artist = settled(&catalog.artist(ArtistId(5))).await;
    assert_eq!(artist.value().unwrap().name, "Test");
    let release = settled(&catalog.release(ReleaseId(10))).await;
    assert_eq!(release.value().unwrap().title, "Release 10");
    assert_eq!(offline.total_calls(), 0);
}

#[tokio::test]
async fn test_payload_invalidation_reaches_entity_responses() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let transport = MockTransport::new();
    transport.insert("artist/5", artist_doc(5, "Test"));
    transport.insert("artist/6", artist_doc(6, "Other"));
    let catalog = catalog_over(&store, Arc::clone(&transport));

    settled(&catalog.artist(ArtistId(5))).await;
    settled(&catalog.artist(ArtistId(6))).await;

    // invalidate by payload content without knowing the keys
    let removed = catalog
        .invalidate(&CacheQuery::data_contains_value(json!({"name": "Test"})))
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(
        catalog.cache().keys(&CacheQuery::all()).unwrap(),
        vec!["artist/6"]
    );
}
