//! Request record table with LRU retention of terminal records.
//!
//! Pending records live in a map and are never evicted. Once a record turns
//! terminal it moves into an LRU keyed by completion order; the least
//! recently completed terminal record is dropped when the LRU is full.
//! Reads never touch recency.
//!
//! Ids carry a salted tag, so the table can tell an id it issued and later
//! evicted (`Expired`) from one it never issued (`NotFound`).

use super::status::{OracleRequest, RequestRecord, RequestStatus};
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::request::{RequestId, REQUEST_TAG_LEN};
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Default terminal record capacity.
pub const DEFAULT_RETENTION_CAPACITY: usize = 100_000;

/// Record table statistics for monitoring.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordStats {
    /// Records created.
    pub submitted: u64,
    /// Records that completed.
    pub completed: u64,
    /// Records that failed.
    pub failed: u64,
    /// Terminal records dropped by retention.
    pub evicted: u64,
    /// Records currently pending.
    pub pending: usize,
}

impl RecordStats {
    /// Failed share of terminal records as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        let total = self.completed + self.failed;
        if total == 0 {
            0.0
        } else {
            (self.failed as f64 / total as f64) * 100.0
        }
    }
}

struct PendingEntry {
    record: RequestRecord,
    notify: watch::Sender<RequestStatus>,
}

struct Inner {
    next_seq: u64,
    pending: HashMap<u64, PendingEntry>,
    terminal: LruCache<u64, RequestRecord>,
    stats: RecordStats,
}

/// Where a waiter stands on a record.
enum Watch {
    Done(RequestStatus),
    Waiting(watch::Receiver<RequestStatus>),
}

/// The single record table behind both blocking and polling retrieval.
pub struct RecordStore {
    salt: [u8; 16],
    inner: Mutex<Inner>,
}

impl RecordStore {
    /// Create a store with default retention.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RETENTION_CAPACITY)
    }

    /// Create a store retaining at most `capacity` terminal records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            salt: rand::random(),
            inner: Mutex::new(Inner {
                next_seq: 0,
                pending: HashMap::new(),
                terminal: LruCache::new(cap),
                stats: RecordStats::default(),
            }),
        }
    }

    fn tag(&self, seq: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt);
        hasher.update(seq.to_be_bytes());
        let mut tag = hex::encode(hasher.finalize());
        tag.truncate(REQUEST_TAG_LEN);
        tag
    }

    /// Allocate an id and store a Pending record for `request`.
    pub fn create(&self, request: impl Into<OracleRequest>, origin: Option<Identity>) -> RequestId {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = RequestId::new(seq, self.tag(seq));

        let (notify, _) = watch::channel(RequestStatus::Pending);
        let record = RequestRecord {
            id: id.clone(),
            request: request.into(),
            origin,
            status: RequestStatus::Pending,
            submitted_at: Utc::now(),
            completed_at: None,
        };
        inner.pending.insert(seq, PendingEntry { record, notify });
        inner.stats.submitted += 1;
        debug!("Created record {id}");
        id
    }

    /// Move a Pending record to its terminal status and wake its waiters.
    ///
    /// Terminal records are final: a second completion is ignored.
    pub fn complete(&self, id: &RequestId, status: RequestStatus) {
        if !status.is_terminal() {
            warn!("Refusing to complete {id} with a non-terminal status");
            return;
        }
        let mut inner = self.inner.lock();
        let Some(PendingEntry { mut record, notify }) = inner.pending.remove(&id.seq()) else {
            warn!("Record {id} is not pending, ignoring completion");
            return;
        };

        match &status {
            RequestStatus::Failed(_) => inner.stats.failed += 1,
            _ => inner.stats.completed += 1,
        }
        record.status = status.clone();
        record.completed_at = Some(Utc::now());

        if let Some((evicted, _)) = inner.terminal.push(id.seq(), record) {
            if evicted != id.seq() {
                inner.stats.evicted += 1;
                debug!("Evicted terminal record {evicted}");
            }
        }
        drop(inner);

        // Receivers keep the last value after the sender is dropped
        notify.send_replace(status);
    }

    /// Current record for `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the id was never issued here
    /// - [`Error::Expired`] if it was issued and its record evicted
    pub fn get(&self, id: &RequestId) -> Result<RequestRecord> {
        let inner = self.inner.lock();
        self.locate(&inner, id, |record| record.clone())
    }

    /// Current status for `id`. See [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub fn status(&self, id: &RequestId) -> Result<RequestStatus> {
        let inner = self.inner.lock();
        self.locate(&inner, id, |record| record.status.clone())
    }

    fn locate<T>(
        &self,
        inner: &Inner,
        id: &RequestId,
        read: impl FnOnce(&RequestRecord) -> T,
    ) -> Result<T> {
        if id.tag() != self.tag(id.seq()) {
            return Err(Error::NotFound(id.to_string()));
        }
        if let Some(entry) = inner.pending.get(&id.seq()) {
            return Ok(read(&entry.record));
        }
        if let Some(record) = inner.terminal.peek(&id.seq()) {
            return Ok(read(record));
        }
        if id.seq() < inner.next_seq {
            return Err(Error::Expired(id.to_string()));
        }
        Err(Error::NotFound(id.to_string()))
    }

    fn watch(&self, id: &RequestId) -> Result<Watch> {
        let inner = self.inner.lock();
        if id.tag() == self.tag(id.seq()) {
            if let Some(entry) = inner.pending.get(&id.seq()) {
                return Ok(Watch::Waiting(entry.notify.subscribe()));
            }
        }
        self.locate(&inner, id, |record| Watch::Done(record.status.clone()))
    }

    /// Wait until `id` is terminal or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the bound elapses; the record stays Pending
    /// - [`Error::NotFound`] / [`Error::Expired`] as for [`get`](Self::get)
    pub async fn wait(&self, id: &RequestId, timeout: Duration) -> Result<RequestStatus> {
        let mut rx = match self.watch(id)? {
            Watch::Done(status) => return Ok(status),
            Watch::Waiting(rx) => rx,
        };

        let waited = tokio::time::timeout(timeout, async {
            loop {
                let current = rx.borrow_and_update().clone();
                if current.is_terminal() {
                    return current;
                }
                if rx.changed().await.is_err() {
                    return rx.borrow().clone();
                }
            }
        })
        .await;

        waited.map_err(|_| {
            debug!("Wait on {id} timed out after {timeout:?}");
            Error::Timeout(timeout)
        })
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> RecordStats {
        let inner = self.inner.lock();
        RecordStats {
            pending: inner.pending.len(),
            ..inner.stats
        }
    }

    /// Number of retained terminal records.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.inner.lock().terminal.len()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
