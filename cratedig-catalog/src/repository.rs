//! Entity repositories and the catalog store.
//!
//! One repository map per entity type, keyed by id, memoizing one
//! [`RemoteResource`] per identity. First reference queues an asynchronous
//! hydrate-or-refresh: the persistent store is consulted first, and only
//! an absent or stale record goes to the network. Every successful refresh
//! persists explicitly at the end of the load path, so hydration never
//! writes back what it just read.
//!
//! Cross-entity lookups (join rows, the master a release belongs to) go
//! through this store rather than any ambient global state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use cratedig_client::{CatalogTransport, RequestCache};
use cratedig_core::{
    Artist, ArtistId, ArtistRole, CatalogError, CratedigResult, CacheQuery, MasterId,
    ReleaseId, Release, RequestDescriptor,
    wire::{ArtistPayload, ReleasePayload},
};
use cratedig_storage::Store;
use tokio::sync::{watch, OnceCell};

use crate::resource::{DerivedResource, LoadFuture, RemoteResource, ResourceState};

/// Normalized entity store.
///
/// Owns the per-type resource maps and the shared handles they load
/// through. Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct CatalogStore {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    store: Store,
    cache: RequestCache,
    transport: Arc<dyn CatalogTransport>,
    artists: Mutex<HashMap<ArtistId, Arc<RemoteResource<Artist>>>>,
    releases: Mutex<HashMap<ReleaseId, Arc<RemoteResource<Release>>>>,
    masters: Mutex<HashMap<MasterId, Arc<RemoteResource<Release>>>>,
    warmed: OnceCell<()>,
}

fn lock<'a, K, V>(map: &'a Mutex<HashMap<K, V>>) -> MutexGuard<'a, HashMap<K, V>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CatalogStore {
    pub fn new(store: Store, cache: RequestCache, transport: Arc<dyn CatalogTransport>) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                store,
                cache,
                transport,
                artists: Mutex::new(HashMap::new()),
                releases: Mutex::new(HashMap::new()),
                masters: Mutex::new(HashMap::new()),
                warmed: OnceCell::new(),
            }),
        }
    }

    pub fn cache(&self) -> &RequestCache {
        &self.inner.cache
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// The artist resource for `id`, memoized.
    ///
    /// First reference registers the resource and queues hydration: a
    /// persisted record settles it directly, anything else refreshes from
    /// the network. Hydration failures are soft and fall through to the
    /// network path.
    pub fn artist(&self, id: ArtistId) -> Arc<RemoteResource<Artist>> {
        let mut map = lock(&self.inner.artists);
        if let Some(existing) = map.get(&id) {
            return Arc::clone(existing);
        }
        let loader_inner = Arc::clone(&self.inner);
        let resource = RemoteResource::new(move || artist_loader(Arc::clone(&loader_inner), id));
        map.insert(id, Arc::clone(&resource));
        drop(map);

        let inner = Arc::clone(&self.inner);
        let handle = Arc::clone(&resource);
        tokio::spawn(async move {
            match inner.store.get_artist(id) {
                Ok(Some(artist)) => handle.resolve(artist),
                Ok(None) => handle.refresh().await,
                Err(e) => {
                    tracing::warn!(artist = %id, error = %e, "artist hydrate failed, refreshing");
                    handle.refresh().await;
                }
            }
        });
        resource
    }

    /// The release resource for `id`, memoized.
    ///
    /// A persisted record with an outdated schema version counts as
    /// absent: it is refreshed, never served as-is.
    pub fn release(&self, id: ReleaseId) -> Arc<RemoteResource<Release>> {
        let mut map = lock(&self.inner.releases);
        if let Some(existing) = map.get(&id) {
            return Arc::clone(existing);
        }
        let loader_inner = Arc::clone(&self.inner);
        let resource = RemoteResource::new(move || release_loader(Arc::clone(&loader_inner), id));
        map.insert(id, Arc::clone(&resource));
        drop(map);

        let inner = Arc::clone(&self.inner);
        let handle = Arc::clone(&resource);
        tokio::spawn(async move {
            match inner.store.get_release(id) {
                Ok(Some(release)) if !release.is_stale() => handle.resolve(release),
                Ok(Some(_)) => {
                    tracing::debug!(release = %id, "stale release record, refreshing");
                    handle.refresh().await;
                }
                Ok(None) => handle.refresh().await,
                Err(e) => {
                    tracing::warn!(release = %id, error = %e, "release hydrate failed, refreshing");
                    handle.refresh().await;
                }
            }
        });
        resource
    }

    /// The master-release resource for `id`, memoized.
    ///
    /// Masters share the release document shape but live in their own id
    /// namespace; they are served through the response cache and not
    /// persisted as releases.
    pub fn master(&self, id: MasterId) -> Arc<RemoteResource<Release>> {
        let mut map = lock(&self.inner.masters);
        if let Some(existing) = map.get(&id) {
            return Arc::clone(existing);
        }
        let loader_inner = Arc::clone(&self.inner);
        let resource = RemoteResource::new(move || master_loader(Arc::clone(&loader_inner), id));
        map.insert(id, Arc::clone(&resource));
        drop(map);

        resource.spawn_refresh();
        resource
    }

    /// Derived resource: the master release that `id` belongs to.
    ///
    /// Recomputes whenever the upstream release resource changes, without
    /// re-implementing any fetch logic. A ready release without a master
    /// id settles into a terminal error until the upstream changes.
    pub fn master_of(&self, id: ReleaseId) -> DerivedResource<Release> {
        let upstream = self.release(id);
        let (tx, rx) = watch::channel(ResourceState::Pending { stale: None });
        let store = self.clone();

        tokio::spawn(async move {
            let mut up_rx = upstream.subscribe();
            'outer: loop {
                let snapshot = up_rx.borrow_and_update().clone();
                match snapshot {
                    ResourceState::Pending { .. } => {
                        tx.send_replace(ResourceState::Pending { stale: None });
                    }
                    ResourceState::Error { message, .. } => {
                        tx.send_replace(ResourceState::Error {
                            message,
                            stale: None,
                        });
                    }
                    ResourceState::Ready(release) => match release.master_id {
                        None => {
                            let err = CatalogError::NoMaster { id: release.id };
                            tx.send_replace(ResourceState::Error {
                                message: err.to_string(),
                                stale: None,
                            });
                        }
                        Some(master_id) => {
                            let master = store.master(master_id);
                            let mut master_rx = master.subscribe();
                            loop {
                                tx.send_replace(master_rx.borrow_and_update().clone());
                                if tx.is_closed() {
                                    break 'outer;
                                }
                                tokio::select! {
                                    changed = master_rx.changed() => {
                                        if changed.is_err() {
                                            break;
                                        }
                                    }
                                    changed = up_rx.changed() => {
                                        if changed.is_err() {
                                            break 'outer;
                                        }
                                        continue 'outer;
                                    }
                                }
                            }
                        }
                    },
                }
                if tx.is_closed() {
                    break;
                }
                if up_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        DerivedResource::new(rx)
    }

    /// One-time bulk warm of every persisted id into memory. Repeated
    /// calls are no-ops once a warm has succeeded.
    pub async fn load_all(&self) -> CratedigResult<()> {
        self.inner
            .warmed
            .get_or_try_init(|| async {
                let artist_ids = self.inner.store.artist_ids()?;
                let release_ids = self.inner.store.release_ids()?;
                for id in artist_ids {
                    let _ = self.artist(id);
                }
                for id in release_ids {
                    let _ = self.release(id);
                }
                tracing::debug!("catalog store warmed");
                Ok::<(), cratedig_core::CratedigError>(())
            })
            .await
            .map(|_| ())
    }

    /// Invalidate cached responses by query, without the caller having to
    /// know storage keys.
    pub fn invalidate(&self, query: &CacheQuery) -> CratedigResult<u64> {
        self.inner.cache.clear(query)
    }

    /// Join rows for an artist, from the persistent store.
    pub fn roles_for_artist(&self, id: ArtistId) -> CratedigResult<Vec<ArtistRole>> {
        Ok(self.inner.store.roles_for_artist(id)?)
    }

    /// Join rows for a release, from the persistent store.
    pub fn roles_for_release(&self, id: ReleaseId) -> CratedigResult<Vec<ArtistRole>> {
        Ok(self.inner.store.roles_for_release(id)?)
    }
}

fn artist_loader(inner: Arc<CatalogInner>, id: ArtistId) -> LoadFuture<Artist> {
    Box::pin(async move {
        let descriptor = RequestDescriptor::get(format!("artist/{id}"));
        let payload = inner
            .cache
            .get(inner.transport.as_ref(), &descriptor)
            .await?;
        let wire: ArtistPayload =
            serde_json::from_value(payload).map_err(|e| CatalogError::PayloadShape {
                target: descriptor.target.clone(),
                reason: e.to_string(),
            })?;
        let artist = wire.into_artist(descriptor.target.clone());
        if let Err(e) = inner.store.put_artist(&artist) {
            tracing::warn!(artist = %artist.id, error = %e, "artist persist failed");
        }
        Ok(artist)
    })
}

fn release_loader(inner: Arc<CatalogInner>, id: ReleaseId) -> LoadFuture<Release> {
    Box::pin(async move {
        let descriptor = RequestDescriptor::get(format!("release/{id}"));
        let payload = inner
            .cache
            .get(inner.transport.as_ref(), &descriptor)
            .await?;
        let wire: ReleasePayload =
            serde_json::from_value(payload).map_err(|e| CatalogError::PayloadShape {
                target: descriptor.target.clone(),
                reason: e.to_string(),
            })?;
        let release = wire.into_release();
        // one transaction: release row, credit join rows, orphan cleanup
        if let Err(e) = inner.store.put_release_with_roles(&release) {
            tracing::warn!(release = %release.id, error = %e, "release persist failed");
        }
        Ok(release)
    })
}

fn master_loader(inner: Arc<CatalogInner>, id: MasterId) -> LoadFuture<Release> {
    Box::pin(async move {
        let descriptor = RequestDescriptor::get(format!("master/{id}"));
        let payload = inner
            .cache
            .get(inner.transport.as_ref(), &descriptor)
            .await?;
        let wire: ReleasePayload =
            serde_json::from_value(payload).map_err(|e| CatalogError::PayloadShape {
                target: descriptor.target.clone(),
                reason: e.to_string(),
            })?;
        Ok(wire.into_release())
    })
}
