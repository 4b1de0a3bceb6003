//! Reactive wrapper around a value obtained from a slow, fallible source.
//!
//! A [`RemoteResource`] holds its state in a watch channel: consumers
//! subscribe explicitly and recompute on notification, nothing is implicit.
//! `refresh` always passes through `Pending` before settling; the previous
//! value stays visible while pending and after a failure so consumers do
//! not flicker. A settled `Error` is terminal until someone calls
//! `refresh` again; there is no automatic retry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use cratedig_core::CratedigResult;
use tokio::sync::watch;

/// Status of a remote-sourced value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceState<T> {
    /// No settled value yet. `stale` carries the previous value, if any.
    Pending { stale: Option<T> },
    /// A value is present.
    Ready(T),
    /// The last refresh failed. `stale` carries the previous value, if any.
    Error { message: String, stale: Option<T> },
}

impl<T> ResourceState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, ResourceState::Pending { .. })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ResourceState::Ready(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResourceState::Error { .. })
    }

    /// The settled value, if ready.
    pub fn value(&self) -> Option<&T> {
        match self {
            ResourceState::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// The freshest value available: the ready value, or the stale one
    /// carried through pending/error.
    pub fn latest(&self) -> Option<&T> {
        match self {
            ResourceState::Ready(value) => Some(value),
            ResourceState::Pending { stale } | ResourceState::Error { stale, .. } => {
                stale.as_ref()
            }
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ResourceState::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Boxed future produced by a resource loader.
pub type LoadFuture<T> = Pin<Box<dyn Future<Output = CratedigResult<T>> + Send>>;

type Loader<T> = Arc<dyn Fn() -> LoadFuture<T> + Send + Sync>;

/// A value obtained from a possibly-slow, possibly-failing source, with
/// explicit status and a repeatable `refresh`.
///
/// Resources are memoized by their owning repository: one instance per
/// identity, shared by every consumer.
pub struct RemoteResource<T> {
    state: watch::Sender<ResourceState<T>>,
    loader: Loader<T>,
}

impl<T: Clone + Send + Sync + 'static> RemoteResource<T> {
    /// Create a resource in `Pending` with the given loader.
    pub fn new<F>(loader: F) -> Arc<Self>
    where
        F: Fn() -> LoadFuture<T> + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(ResourceState::Pending { stale: None });
        Arc::new(Self {
            state,
            loader: Arc::new(loader),
        })
    }

    /// Snapshot of the current status.
    pub fn state(&self) -> ResourceState<T> {
        self.state.borrow().clone()
    }

    /// Subscribe to status changes. Every logical transition publishes
    /// exactly one update.
    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.state.subscribe()
    }

    /// Re-run the loader: `Pending` (previous value kept visible), then
    /// `Ready` or `Error`.
    pub async fn refresh(&self) {
        let prior = match self.state() {
            ResourceState::Ready(value) => Some(value),
            ResourceState::Pending { stale } | ResourceState::Error { stale, .. } => stale,
        };
        self.state.send_replace(ResourceState::Pending {
            stale: prior.clone(),
        });

        match (self.loader)().await {
            Ok(value) => {
                self.state.send_replace(ResourceState::Ready(value));
            }
            Err(e) => {
                self.state.send_replace(ResourceState::Error {
                    message: e.to_string(),
                    stale: prior,
                });
            }
        }
    }

    /// Kick off a refresh without waiting for it.
    pub fn spawn_refresh(self: &Arc<Self>) {
        let resource = Arc::clone(self);
        tokio::spawn(async move {
            resource.refresh().await;
        });
    }

    /// Settle directly into `Ready` without running the loader. Used for
    /// hydration from local storage.
    pub(crate) fn resolve(&self, value: T) {
        self.state.send_replace(ResourceState::Ready(value));
    }
}

/// Read-only view of a resource computed from other resources.
///
/// Derived resources recompute whenever an upstream status changes; they
/// own no loader of their own.
#[derive(Clone)]
pub struct DerivedResource<T> {
    rx: watch::Receiver<ResourceState<T>>,
}

impl<T: Clone> DerivedResource<T> {
    pub(crate) fn new(rx: watch::Receiver<ResourceState<T>>) -> Self {
        Self { rx }
    }

    pub fn state(&self) -> ResourceState<T> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.rx.clone()
    }
}
