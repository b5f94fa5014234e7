// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded keyed store with explicit TTL eviction.
//!
//! Holds short-lived secrets: email verification codes and OAuth `state`
//! values. Process-local, lost on restart, not shared between instances.
//!
//! ## Layout
//!
//! - `entries`: LRU map key → (value, deadline, stamp). Capacity-bounded.
//! - `expiry`: ordered index (deadline, stamp) → key, so a sweep pops
//!   expired keys from the front instead of scanning every entry.
//!
//! The stamp ties an index row to one specific insertion. Rows left behind by
//! overwrites or LRU eviction are skipped when their stamp no longer matches.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct Entry<V> {
    value: V,
    deadline: Instant,
    stamp: u64,
}

struct Inner<V> {
    entries: LruCache<String, Entry<V>>,
    expiry: BTreeMap<(Instant, u64), String>,
    next_stamp: u64,
}

/// Keyed store whose entries vanish after a fixed TTL.
pub struct ExpiringStore<V> {
    inner: Mutex<Inner<V>>,
    ttl: Duration,
}

impl<V: Clone> ExpiringStore<V> {
    /// Create a store holding at most `capacity` live entries.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
                expiry: BTreeMap::new(),
                next_stamp: 0,
            }),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace the value for `key`.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_at(key.into(), value, Instant::now());
    }

    /// Look up a live value without consuming it.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Remove and return a live value (single use).
    pub fn take(&self, key: &str) -> Option<V> {
        self.take_at(key, Instant::now())
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(entry) = inner.entries.pop(key) {
                inner.expiry.remove(&(entry.deadline, entry.stamp));
            }
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_at(&self, key: String, value: V, now: Instant) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let stamp = inner.next_stamp;
        inner.next_stamp += 1;
        let deadline = now + self.ttl;

        inner.expiry.insert((deadline, stamp), key.clone());
        // `push` hands back either the previous value for this key or the
        // least recently used entry it displaced.
        if let Some((_, displaced)) = inner.entries.push(key, Entry { value, deadline, stamp }) {
            inner.expiry.remove(&(displaced.deadline, displaced.stamp));
        }
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut inner = self.inner.lock().ok()?;
        let deadline = inner.entries.peek(key)?.deadline;
        if deadline <= now {
            if let Some(entry) = inner.entries.pop(key) {
                inner.expiry.remove(&(entry.deadline, entry.stamp));
            }
            return None;
        }
        inner.entries.get(key).map(|e| e.value.clone())
    }

    fn take_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut inner = self.inner.lock().ok()?;
        let entry = inner.entries.pop(key)?;
        inner.expiry.remove(&(entry.deadline, entry.stamp));
        (entry.deadline > now).then_some(entry.value)
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let mut removed = 0;
        while let Some((&(deadline, stamp), _)) = inner.expiry.first_key_value() {
            if deadline > now {
                break;
            }
            let Some(key) = inner.expiry.remove(&(deadline, stamp)) else {
                break;
            };
            let current = inner.entries.peek(&key).map(|e| e.stamp);
            if current == Some(stamp) {
                inner.entries.pop(&key);
                removed += 1;
            }
        }
        removed
    }
}

/// Periodically sweep a set of stores until cancelled.
///
/// ```rust,ignore
/// tokio::spawn(run_sweeper(vec![codes.clone()], Duration::from_secs(30), shutdown.clone()));
/// ```
pub async fn run_sweeper(
    stores: Vec<Arc<dyn Sweep>>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), stores = stores.len(), "TTL sweeper starting");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let removed: usize = stores.iter().map(|s| s.sweep_expired()).sum();
                if removed > 0 {
                    debug!(removed, "TTL sweep removed expired entries");
                }
            }
            _ = shutdown.cancelled() => {
                info!("TTL sweeper shutting down");
                return;
            }
        }
    }
}

/// Object-safe handle so stores of different value types share one sweeper.
pub trait Sweep: Send + Sync {
    fn sweep_expired(&self) -> usize;
}

impl<V: Clone + Send> Sweep for ExpiringStore<V> {
    fn sweep_expired(&self) -> usize {
        self.sweep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn live_entries_are_returned() {
        let store = ExpiringStore::new(8, TTL);
        store.insert("a@x.io", "123456".to_string());
        assert_eq!(store.get("a@x.io").as_deref(), Some("123456"));
        assert_eq!(store.get("a@x.io").as_deref(), Some("123456"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_entries_are_invisible() {
        let store = ExpiringStore::new(8, TTL);
        let t0 = Instant::now();
        store.insert_at("k".to_string(), 1u32, t0);
        assert_eq!(store.get_at("k", t0 + Duration::from_secs(59)), Some(1));
        assert_eq!(store.get_at("k", t0 + TTL), None);
        assert!(store.is_empty());
    }

    #[test]
    fn take_is_single_use() {
        let store = ExpiringStore::new(8, TTL);
        store.insert("state-1", "google".to_string());
        assert_eq!(store.take("state-1").as_deref(), Some("google"));
        assert_eq!(store.take("state-1"), None);
    }

    #[test]
    fn take_refuses_expired_value() {
        let store = ExpiringStore::new(8, TTL);
        let t0 = Instant::now();
        store.insert_at("k".to_string(), 5u8, t0);
        assert_eq!(store.take_at("k", t0 + TTL + Duration::from_secs(1)), None);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = ExpiringStore::new(8, TTL);
        let t0 = Instant::now();
        store.insert_at("old".to_string(), 1u8, t0);
        store.insert_at("new".to_string(), 2u8, t0 + Duration::from_secs(30));

        assert_eq!(store.sweep_at(t0 + TTL), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_at("new", t0 + TTL), Some(2));
    }

    #[test]
    fn overwrite_extends_deadline_and_leaves_no_stale_index() {
        let store = ExpiringStore::new(8, TTL);
        let t0 = Instant::now();
        store.insert_at("k".to_string(), 1u8, t0);
        store.insert_at("k".to_string(), 2u8, t0 + Duration::from_secs(40));

        assert_eq!(store.sweep_at(t0 + TTL), 0);
        assert_eq!(store.get_at("k", t0 + TTL), Some(2));
        assert_eq!(store.inner.lock().unwrap().expiry.len(), 1);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let store = ExpiringStore::new(2, TTL);
        store.insert("a", 1u8);
        store.insert("b", 2u8);
        store.insert("c", 3u8);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a"), None);
        assert_eq!(store.inner.lock().unwrap().expiry.len(), 2);
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let store: Arc<ExpiringStore<u8>> = Arc::new(ExpiringStore::new(4, Duration::from_millis(1)));
        store.insert("k", 1);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_sweeper(
            vec![store.clone() as Arc<dyn Sweep>],
            Duration::from_millis(5),
            shutdown.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        handle.await.unwrap();
        assert!(store.is_empty());
    }
}
