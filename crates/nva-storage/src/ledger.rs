//! Process-wide identity ledger
//!
//! Maps `(api url, store, origin id)` to what the store recorded for that
//! origin: the assigned blob id plus the hash and size of the bytes sent.
//! Each slot is a `OnceCell`, so concurrent uploads of one origin share a
//! single `put` and every caller observes the same id. A failed `put`
//! leaves the slot empty and the next caller retries.
//!
//! Completed slots are evicted oldest-first once the ledger holds more than
//! its capacity. Slots still waiting on a `put` are never evicted. After
//! eviction a repeat upload of the same origin reaches the store again,
//! which dedupes on the origin id.

use dashmap::DashMap;
use nva_core::{BlobId, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 4096;

type Key = (String, String, Uuid);

/// What a store accepted for one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub blob_id: BlobId,
    pub hash: String,
    pub size: u64,
}

struct Slot {
    seq: u64,
    cell: OnceCell<Recorded>,
}

pub struct Ledger {
    slots: DashMap<Key, Arc<Slot>>,
    next_seq: AtomicU64,
    capacity: usize,
}

static LEDGER: LazyLock<Ledger> = LazyLock::new(|| Ledger::with_capacity(DEFAULT_CAPACITY));

fn key(api_url: &str, store: &str, origin_id: Uuid) -> Key {
    (api_url.to_string(), store.to_string(), origin_id)
}

impl Ledger {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            next_seq: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Run `put` at most once per key and return what was recorded.
    pub async fn assign_once<F, Fut>(
        &self,
        api_url: &str,
        store: &str,
        origin_id: Uuid,
        put: F,
    ) -> Result<Recorded>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Recorded>>,
    {
        let key = key(api_url, store, origin_id);
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Slot {
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    cell: OnceCell::new(),
                })
            })
            .clone();

        match slot.cell.get_or_try_init(put).await {
            Ok(recorded) => {
                let recorded = recorded.clone();
                self.evict_completed();
                Ok(recorded)
            }
            Err(e) => {
                // Only drop the slot when no other caller is waiting on it.
                self.slots.remove_if(&key, |_, s| {
                    Arc::ptr_eq(s, &slot) && !s.cell.initialized() && Arc::strong_count(s) <= 2
                });
                Err(e)
            }
        }
    }

    pub fn recorded(&self, api_url: &str, store: &str, origin_id: Uuid) -> Option<Recorded> {
        self.slots
            .get(&key(api_url, store, origin_id))
            .and_then(|slot| slot.cell.get().cloned())
    }

    /// Drop every slot that points at `blob_id` in `store`.
    pub fn forget(&self, api_url: &str, store: &str, blob_id: BlobId) {
        self.slots.retain(|(url, s, _), slot| {
            !(url == api_url
                && s == store
                && slot.cell.get().is_some_and(|r| r.blob_id == blob_id))
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn evict_completed(&self) {
        if self.slots.len() <= self.capacity {
            return;
        }
        let keep_from = self
            .next_seq
            .load(Ordering::Relaxed)
            .saturating_sub((self.capacity / 2) as u64);
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| !slot.cell.initialized() || slot.seq >= keep_from);
        debug!(evicted = before.saturating_sub(self.slots.len()), "ledger pruned");
    }
}

/// Run `put` at most once per key on the process-wide ledger.
pub async fn assign_once<F, Fut>(
    api_url: &str,
    store: &str,
    origin_id: Uuid,
    put: F,
) -> Result<Recorded>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Recorded>>,
{
    LEDGER.assign_once(api_url, store, origin_id, put).await
}

/// What the process-wide ledger holds for an origin, if anything.
pub fn recorded(api_url: &str, store: &str, origin_id: Uuid) -> Option<Recorded> {
    LEDGER.recorded(api_url, store, origin_id)
}

pub fn forget(api_url: &str, store: &str, blob_id: BlobId) {
    LEDGER.forget(api_url, store, blob_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nva_core::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const URL: &str = "memory://ledger-tests";

    fn fresh(size: u64) -> Recorded {
        Recorded {
            blob_id: BlobId::generate(),
            hash: format!("h{}", size),
            size,
        }
    }

    #[tokio::test]
    async fn test_assign_once_runs_put_once() {
        let ledger = Ledger::with_capacity(16);
        let origin = Uuid::new_v4();
        let calls = AtomicUsize::new(0);
        let first = ledger
            .assign_once(URL, "default", origin, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(fresh(1))
            })
            .await
            .unwrap();
        let second = ledger
            .assign_once(URL, "default", origin, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(fresh(2))
            })
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(second.size, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.recorded(URL, "default", origin), Some(first));
    }

    #[tokio::test]
    async fn test_failure_leaves_slot_empty() {
        let ledger = Ledger::with_capacity(16);
        let origin = Uuid::new_v4();
        let err = ledger
            .assign_once(URL, "default", origin, || async {
                Err(Error::Connection("down".to_string()))
            })
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(ledger.recorded(URL, "default", origin).is_none());
        assert!(ledger.is_empty());

        let recorded = ledger
            .assign_once(URL, "default", origin, || async { Ok(fresh(3)) })
            .await
            .unwrap();
        assert!(!recorded.blob_id.is_nil());
    }

    #[tokio::test]
    async fn test_forget() {
        let ledger = Ledger::with_capacity(16);
        let origin = Uuid::new_v4();
        let recorded = ledger
            .assign_once(URL, "lab", origin, || async { Ok(fresh(4)) })
            .await
            .unwrap();
        ledger.forget(URL, "other", recorded.blob_id);
        assert!(ledger.recorded(URL, "lab", origin).is_some());
        ledger.forget(URL, "lab", recorded.blob_id);
        assert!(ledger.recorded(URL, "lab", origin).is_none());
    }

    #[tokio::test]
    async fn test_completed_slots_are_bounded() {
        let ledger = Ledger::with_capacity(8);
        let origins: Vec<Uuid> = (0..100).map(|_| Uuid::new_v4()).collect();
        for (i, origin) in origins.iter().enumerate() {
            ledger
                .assign_once(URL, "default", *origin, || async { Ok(fresh(i as u64)) })
                .await
                .unwrap();
            assert!(ledger.len() <= 8, "ledger grew to {}", ledger.len());
        }
        assert_eq!(ledger.recorded(URL, "default", origins[99]).map(|r| r.size), Some(99));
        assert!(ledger.recorded(URL, "default", origins[0]).is_none());
    }

    #[tokio::test]
    async fn test_global_ledger_delegates() {
        let origin = Uuid::new_v4();
        let stored = assign_once(URL, "global", origin, || async { Ok(fresh(5)) })
            .await
            .unwrap();
        assert_eq!(recorded(URL, "global", origin), Some(stored.clone()));
        forget(URL, "global", stored.blob_id);
        assert!(recorded(URL, "global", origin).is_none());
    }
}
