//! Block cache
//!
//! LRU cache of table contents shared by every store registered with it.
//! Entries are keyed by a store-unique table name, so one cache can serve
//! several engines (including in-memory ones) at once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

/// Shared LRU cache of table bytes
#[derive(Debug)]
pub struct BlockCache {
    inner: Mutex<CacheInner>,
    capacity_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, Bytes>,
    /// Most recently used at the front
    order: VecDeque<String>,
    usage: usize,
}

impl BlockCache {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a table by name, promoting it on a hit
    pub fn get(&self, name: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        match inner.map.get(name).cloned() {
            Some(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                promote(&mut inner.order, name);
                Some(data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert table bytes, evicting least recently used entries to fit.
    /// Entries larger than the whole cache are not cached.
    pub fn insert(&self, name: &str, data: Bytes) {
        if data.len() > self.capacity_bytes {
            return;
        }

        let mut inner = self.inner.lock();
        if let Some(old) = inner.map.remove(name) {
            inner.usage -= old.len();
            inner.order.retain(|n| n != name);
        }

        while inner.usage + data.len() > self.capacity_bytes {
            let Some(victim) = inner.order.pop_back() else {
                break;
            };
            if let Some(evicted) = inner.map.remove(&victim) {
                inner.usage -= evicted.len();
            }
        }

        inner.usage += data.len();
        inner.order.push_front(name.to_owned());
        inner.map.insert(name.to_owned(), data);
    }

    /// Drop a table that no longer exists
    pub fn erase(&self, name: &str) {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.map.remove(name) {
            inner.usage -= old.len();
            inner.order.retain(|n| n != name);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity_bytes
    }

    /// Bytes currently held
    pub fn usage(&self) -> usize {
        self.inner.lock().usage
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

fn promote(order: &mut VecDeque<String>, name: &str) {
    if let Some(pos) = order.iter().position(|n| n == name) {
        if let Some(entry) = order.remove(pos) {
            order.push_front(entry);
        }
    }
}
