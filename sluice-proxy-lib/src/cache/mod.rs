//! Short-lived in-memory response cache.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ahash::AHashMap;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tokio::time::Instant;

/// A stored upstream response
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub expires_at: Instant,
}

impl CachedResponse {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// TTL cache keyed by method and request URI.
///
/// Expired entries are dropped on lookup and on [`ResponseCache::purge_expired`].
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<AHashMap<String, CachedResponse>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(AHashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Only safe, side-effect free methods are cached.
    pub fn is_cacheable(method: &Method) -> bool {
        method == Method::GET || method == Method::HEAD
    }

    pub fn key(method: &Method, path_and_query: &str) -> String {
        format!("{method} {path_and_query}")
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<String, CachedResponse>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a response. Anything but `200 OK` is ignored; returns whether it was stored.
    pub fn put(&self, key: String, status: StatusCode, headers: HeaderMap, body: Bytes) -> bool {
        if status != StatusCode::OK {
            return false;
        }
        let entry = CachedResponse { status, headers, body, expires_at: Instant::now() + self.ttl };
        self.lock().insert(key, entry);
        true
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
