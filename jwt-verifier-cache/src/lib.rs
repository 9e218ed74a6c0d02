//! Time-bounded, keyed cache with single-flight loading.
//!
//! [`TtlCache`] stores values produced by a [`Loader`] for a fixed TTL.
//! Concurrent misses for the same key share one in-flight load, failed loads
//! are never stored, and a background task sweeps expired entries every
//! cleanup interval until the cache is dropped or [`TtlCache::shutdown`] is
//! called.

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

/// Produces the value for a key on a cache miss.
///
/// The returned future must be `'static`: it may outlive the caller that
/// triggered it when other callers are waiting on the same load.
pub type Loader<V, E> = Arc<dyn Fn(String) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

type InFlight<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct Inner<V, E> {
    entries: DashMap<String, Entry<V>>,
    in_flight: Mutex<HashMap<String, InFlight<V, E>>>,
    loader: Loader<V, E>,
    ttl: Duration,
}

impl<V, E> Inner<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn lookup(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_live(now) {
            return Some(entry.value.clone());
        }
        // Expired: drop the read guard before removing
        drop(entry);
        self.entries.remove_if(key, |_, e| !e.is_live(now));
        None
    }

    fn store(&self, key: String, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(key, Entry { value, expires_at });
    }

    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Build the shared load future for `key`. The future holds only a weak
    /// reference to the cache so an abandoned load cannot keep it alive.
    fn start_load(self: &Arc<Self>, key: &str) -> InFlight<V, E> {
        let weak = Arc::downgrade(self);
        let loader = Arc::clone(&self.loader);
        let key = key.to_string();

        async move {
            debug!(key = %key, "cache miss, loading");
            let result = loader(key.clone()).await;
            if let Some(inner) = weak.upgrade() {
                // Publish the entry before retiring the in-flight marker; a
                // caller must always find one of the two.
                if let Ok(value) = &result {
                    inner.store(key.clone(), value.clone());
                }
                inner
                    .in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key);
            }
            if result.is_err() {
                debug!(key = %key, "load failed, not caching");
            }
            result
        }
        .boxed()
        .shared()
    }
}

/// A thread-safe TTL cache backed by `DashMap` with single-flight loads.
///
/// Entries expire `ttl` after they were loaded and are never refreshed in
/// place; they are evicted lazily on access and eagerly by the sweep.
pub struct TtlCache<V, E> {
    inner: Arc<Inner<V, E>>,
    shutdown: CancellationToken,
    _sweeper: Arc<DropGuard>,
}

impl<V, E> Clone for TtlCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            shutdown: self.shutdown.clone(),
            _sweeper: Arc::clone(&self._sweeper),
        }
    }
}

impl<V, E> TtlCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a cache and, when called inside a tokio runtime, start the
    /// background sweep. A zero `cleanup_interval` disables the sweep.
    pub fn new(loader: Loader<V, E>, ttl: Duration, cleanup_interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            entries: DashMap::new(),
            in_flight: Mutex::new(HashMap::new()),
            loader,
            ttl,
        });
        let shutdown = CancellationToken::new();

        if cleanup_interval.is_zero() {
            debug!("cache sweep disabled");
        } else {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(sweep(
                        Arc::downgrade(&inner),
                        cleanup_interval,
                        shutdown.clone(),
                    ));
                }
                Err(_) => warn!("no tokio runtime, expired entries will only be evicted on access"),
            }
        }

        Self {
            inner,
            _sweeper: Arc::new(shutdown.clone().drop_guard()),
            shutdown,
        }
    }

    /// Get the value for `key`, loading it if absent or expired.
    ///
    /// Concurrent callers missing on the same key await a single load.
    pub async fn get(&self, key: &str) -> Result<V, E> {
        if let Some(value) = self.inner.lookup(key) {
            trace!(key, "cache hit");
            return Ok(value);
        }

        let pending = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // A load may have completed between the lookup and taking the lock.
            if let Some(value) = self.inner.lookup(key) {
                return Ok(value);
            }
            match in_flight.get(key) {
                Some(pending) => {
                    trace!(key, "joining in-flight load");
                    pending.clone()
                }
                None => {
                    let pending = self.inner.start_load(key);
                    in_flight.insert(key.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Get a cached value if it exists and hasn't expired, without loading.
    pub fn peek(&self, key: &str) -> Option<V> {
        self.inner.lookup(key)
    }

    /// Insert or replace a value; it expires `ttl` from now.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.store(key.into(), value);
    }

    /// Remove a specific entry from the cache.
    pub fn remove(&self, key: &str) {
        self.inner.entries.remove(key);
    }

    /// Remove all entries from the cache.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn evict_expired(&self) -> usize {
        self.inner.evict_expired()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Stop the background sweep. Lazy eviction keeps working.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn sweep<V, E>(inner: Weak<Inner<V, E>>, interval: Duration, shutdown: CancellationToken)
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let Some(cache) = inner.upgrade() else { break };
                let removed = cache.evict_expired();
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        }
    }
    trace!("cache sweep stopped");
}
