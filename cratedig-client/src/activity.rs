//! Activity tracking for asynchronous operations.
//!
//! Pure bookkeeping: records are registered when an operation starts and
//! sealed exactly once when it settles. Tracking never alters the outcome
//! of the tracked operation, and subscribers that lag or disappear never
//! affect it either (broadcast send failures are ignored).
//!
//! The tracker is constructed explicitly and handed to the components that
//! need it; there is no process-global instance.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use cratedig_core::ActivityRecord;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notification published on the tracker's event channel.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    Started {
        id: Uuid,
        category: String,
        detail: String,
    },
    Finished {
        id: Uuid,
        category: String,
        error: Option<String>,
    },
}

/// Records start/end/failure of tracked operations.
///
/// Cloning is cheap; all clones share one log.
#[derive(Clone)]
pub struct ActivityTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    records: RwLock<Vec<ActivityRecord>>,
    events: broadcast::Sender<ActivityEvent>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(TrackerInner {
                records: RwLock::new(Vec::new()),
                events,
            }),
        }
    }

    /// Run `op` with its lifecycle recorded.
    ///
    /// The operation's output passes through unchanged; a failed
    /// operation seals its record with the error's display text.
    pub async fn track<F, T, E>(&self, category: &str, detail: &str, op: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let record = ActivityRecord::begin(category, detail);
        let id = record.id;
        if let Ok(mut records) = self.inner.records.write() {
            records.push(record);
        }
        let _ = self.inner.events.send(ActivityEvent::Started {
            id,
            category: category.to_string(),
            detail: detail.to_string(),
        });

        let result = op.await;

        let error_text = result.as_ref().err().map(|e| e.to_string());
        if let Ok(mut records) = self.inner.records.write() {
            if let Some(r) = records.iter_mut().rev().find(|r| r.id == id) {
                r.finished_at = Some(Utc::now());
                r.error = error_text.clone();
            }
        }
        let _ = self.inner.events.send(ActivityEvent::Finished {
            id,
            category: category.to_string(),
            error: error_text,
        });

        result
    }

    /// Unsealed records in a category.
    pub fn inflight(&self, category: &str) -> Vec<ActivityRecord> {
        self.filtered(category, |r| !r.is_settled())
    }

    pub fn inflight_count(&self, category: &str) -> usize {
        self.inflight(category).len()
    }

    /// All records in a category, settled or not.
    pub fn history(&self, category: &str) -> Vec<ActivityRecord> {
        self.filtered(category, |_| true)
    }

    /// Records in a category bucketed by start time.
    ///
    /// Buckets are aligned to `bucket_width` boundaries; unsettled records
    /// count toward their bucket like settled ones. Returns
    /// (bucket start, record count) pairs in ascending order, empty
    /// buckets omitted.
    pub fn throughput(
        &self,
        category: &str,
        bucket_width: Duration,
    ) -> Vec<(DateTime<Utc>, u64)> {
        let width_ms = bucket_width.as_millis().max(1) as i64;
        let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
        for record in self.history(category) {
            let bucket = record.started_at.timestamp_millis().div_euclid(width_ms);
            *buckets.entry(bucket).or_insert(0) += 1;
        }
        buckets
            .into_iter()
            .filter_map(|(bucket, count)| {
                Utc.timestamp_millis_opt(bucket * width_ms)
                    .single()
                    .map(|start| (start, count))
            })
            .collect()
    }

    /// Drop settled records that finished before the cutoff. Unsealed
    /// records are always retained. Returns how many were dropped.
    pub fn prune(&self, max_age: Duration) -> u64 {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let mut dropped = 0u64;
        if let Ok(mut records) = self.inner.records.write() {
            records.retain(|r| match r.finished_at {
                Some(finished) if finished < cutoff => {
                    dropped += 1;
                    false
                }
                _ => true,
            });
        }
        dropped
    }

    /// Subscribe to start/finish notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.inner.events.subscribe()
    }

    fn filtered(
        &self,
        category: &str,
        predicate: impl Fn(&ActivityRecord) -> bool,
    ) -> Vec<ActivityRecord> {
        match self.inner.records.read() {
            Ok(records) => records
                .iter()
                .filter(|r| r.category == category && predicate(r))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
