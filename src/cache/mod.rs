//! In-memory key/value cache with per-entry time-to-live.
//!
//! Expiration happens two ways:
//!
//! - **Lazy:** every read checks the entry age and removes an expired entry in
//!   the same call, so callers never observe a stale value.
//! - **Active:** an optional [`Sweeper`] task scans the whole table on a fixed
//!   interval and collects whatever expired without being read again.
//!
//! All operations, including the sweep, serialize on a single cache-wide lock.
//! Entry counts are bounded by active users, so one lock keeps per-key updates
//! linearizable without much contention.
//!
//! An entry may carry an eviction callback. It runs exactly once, right before
//! the entry leaves the table through lazy eviction, the sweeper or `delete`.
//! The entry is removed even if the callback fails; the failure is logged.

mod value;

pub use value::{CacheError, CacheValue};

use std::{collections::HashMap, fmt, sync::Arc, sync::Weak, time::Duration};
use tokio::{
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Hook invoked with the key and value of an entry about to be evicted.
pub type EvictionCallback = Box<dyn FnOnce(&str, &CacheValue) -> Result<(), String> + Send>;

struct CacheEntry {
    value: CacheValue,
    last_access: Instant,
    ttl: Duration,
    on_evict: Option<EvictionCallback>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_access) >= self.ttl
    }

    fn evict(mut self, key: &str) {
        if let Some(callback) = self.on_evict.take() {
            if let Err(err) = callback(key, &self.value) {
                warn!("eviction callback for {} failed: {}", key, err);
            }
        }
    }
}

struct Inner {
    entries: Mutex<HashMap<String, CacheEntry>>,
    sweep_interval: Duration,
}

/// Cheaply clonable handle to a shared cache table.
#[derive(Clone)]
pub struct TtlCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("sweep_interval", &self.inner.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// A zero interval falls back to [`DEFAULT_SWEEP_INTERVAL`].
    #[must_use]
    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        let sweep_interval = if sweep_interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else {
            sweep_interval
        };

        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                sweep_interval,
            }),
        }
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Insert or replace `key`. Replacing resets the access time and drops the
    /// previous entry's callback without running it.
    pub async fn put(&self, key: impl Into<String>, value: impl Into<CacheValue>, ttl: Duration) {
        self.insert(key.into(), value.into(), ttl, None).await;
    }

    pub async fn put_with_callback(
        &self,
        key: impl Into<String>,
        value: impl Into<CacheValue>,
        ttl: Duration,
        on_evict: EvictionCallback,
    ) {
        self.insert(key.into(), value.into(), ttl, Some(on_evict))
            .await;
    }

    async fn insert(
        &self,
        key: String,
        value: CacheValue,
        ttl: Duration,
        on_evict: Option<EvictionCallback>,
    ) {
        let mut entries = self.inner.entries.lock().await;
        entries.insert(
            key,
            CacheEntry {
                value,
                last_access: Instant::now(),
                ttl,
                on_evict,
            },
        );
    }

    /// Returns the live value for `key`, evicting it first if it expired.
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let mut entries = self.inner.entries.lock().await;
        let value = live_entry(&mut entries, key, Instant::now()).map(|entry| entry.value.clone());
        if value.is_some() {
            debug!("get from cache: {} success", key);
        } else {
            debug!("get miss from cache: {}", key);
        }
        value
    }

    pub async fn exists(&self, key: &str) -> bool {
        let mut entries = self.inner.entries.lock().await;
        live_entry(&mut entries, key, Instant::now()).is_some()
    }

    /// Removes `key`.
    ///
    /// # Errors
    /// Returns `CacheError::NotFound` if the key is absent or already expired.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.inner.entries.lock().await;
        let now = Instant::now();
        match entries.remove(key) {
            Some(entry) if !entry.is_expired(now) => {
                debug!("delete from cache: {}", key);
                entry.evict(key);
                Ok(())
            }
            Some(entry) => {
                entry.evict(key);
                Err(CacheError::NotFound(key.to_string()))
            }
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    /// Adds one to a numeric value in place, keeping its access time and TTL.
    ///
    /// # Errors
    /// Returns `CacheError::NotFound` if the key is absent, `TypeMismatch` for
    /// non-numeric values and `Overflow` at the numeric bound.
    pub async fn increment(&self, key: &str) -> Result<CacheValue, CacheError> {
        let mut entries = self.inner.entries.lock().await;
        let entry = live_entry(&mut entries, key, Instant::now())
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        entry.value.increment(key)?;
        Ok(entry.value.clone())
    }

    /// Subtracts one from a numeric value in place.
    ///
    /// # Errors
    /// Returns `CacheError::NotFound` if the key is absent, `TypeMismatch` for
    /// non-numeric values and `Underflow` for an unsigned value at zero.
    pub async fn decrement(&self, key: &str) -> Result<CacheValue, CacheError> {
        let mut entries = self.inner.entries.lock().await;
        let entry = live_entry(&mut entries, key, Instant::now())
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        entry.value.decrement(key)?;
        Ok(entry.value.clone())
    }

    /// Read-modify-write of `key` inside one critical section.
    ///
    /// `update` receives the current live value (if any) and returns the new
    /// value and TTL. Concurrent callers on the same key are applied in strict
    /// sequence.
    pub async fn upsert<F>(&self, key: &str, update: F) -> CacheValue
    where
        F: FnOnce(Option<&CacheValue>) -> (CacheValue, Duration),
    {
        let mut entries = self.inner.entries.lock().await;
        let now = Instant::now();
        let (value, ttl) = update(live_entry(&mut entries, key, now).map(|entry| &entry.value));
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                last_access: now,
                ttl,
                on_evict: None,
            },
        );
        value
    }

    /// Number of physically stored entries, including expired ones that
    /// nothing has collected yet.
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entries.lock().await.is_empty()
    }

    /// Drops every entry without running callbacks.
    pub async fn clear(&self) {
        self.inner.entries.lock().await.clear();
    }

    /// Live key/value pairs at this instant.
    pub async fn snapshot(&self) -> HashMap<String, CacheValue> {
        let entries = self.inner.entries.lock().await;
        let now = Instant::now();
        entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Runs one active expiration pass and returns how many entries it evicted.
    pub async fn sweep(&self) -> usize {
        sweep_entries(&self.inner).await
    }

    /// Spawns the periodic sweeper on the current tokio runtime.
    ///
    /// The task ends when the returned handle is shut down or dropped, or when
    /// every clone of the cache is gone.
    #[must_use]
    pub fn start_sweeper(&self) -> Sweeper {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let cache: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = cache.upgrade() else {
                            break;
                        };
                        let evicted = sweep_entries(&inner).await;
                        if evicted > 0 {
                            debug!("cache sweep evicted {} entries", evicted);
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }

            debug!("cache sweeper stopped");
        });

        Sweeper {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Returns the entry for `key` if it is still live, evicting it otherwise.
fn live_entry<'a>(
    entries: &'a mut HashMap<String, CacheEntry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut CacheEntry> {
    if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
        if let Some(entry) = entries.remove(key) {
            debug!("delete expired entry from cache: {}", key);
            entry.evict(key);
        }
        return None;
    }
    entries.get_mut(key)
}

async fn sweep_entries(inner: &Inner) -> usize {
    let mut entries = inner.entries.lock().await;
    let now = Instant::now();

    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();

    for key in &expired {
        if let Some(entry) = entries.remove(key) {
            debug!("delete from cache by sweep: {}", key);
            entry.evict(key);
        }
    }

    expired.len()
}

/// Handle to the background sweep task of a [`TtlCache`].
#[derive(Debug)]
pub struct Sweeper {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Signals the task to stop and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!("cache sweeper ended abnormally: {}", err);
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
