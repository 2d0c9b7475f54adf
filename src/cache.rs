use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::CacheConfig;
use crate::store::{CacheStore, StoreError, StoreResult};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process [CacheStore] with per-entry expiry.
///
/// Expired entries are dropped when read, or in bulk by [InMemoryCache::purge_expired]. The
/// cache serves nothing until [InMemoryCache::connect] succeeds, and connecting fails while
/// the cache is disabled in its [CacheConfig].
pub struct InMemoryCache {
    enabled: bool,
    connected: AtomicBool,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        InMemoryCache {
            enabled: config.enabled,
            connected: AtomicBool::new(false),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn connect(&self) -> bool {
        if !self.enabled {
            info!("Cache is disabled");
            return false;
        }
        self.connected.store(true, Ordering::SeqCst);
        info!("Connected to cache");
        true
    }

    /// Disconnect and drop every entry.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let mut entries = self.entries.lock().unwrap_or_else(|e| {
                warn!("Cache lock poisoned; clearing entries anyway");
                PoisonError::into_inner(e)
            });
            entries.clear();
            info!("Disconnected from cache");
        }
    }

    /// Remove expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let mut entries = self.entries()?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }

    /// Number of stored entries, expired ones included until they are purged.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn entries(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        if !self.is_connected() {
            return Err(StoreError::Unavailable);
        }
        self.lock()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

impl CacheStore for InMemoryCache {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut entries = self.entries()?;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                debug!("Cache entry expired: {}", key);
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Backend(format!("TTL of {:?} is out of range", ttl)))?;
        let mut entries = self.entries()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use std::sync::Arc;
    use std::thread::sleep;

    const TTL: Duration = Duration::from_secs(300);

    fn connected_cache() -> InMemoryCache {
        let cache = InMemoryCache::new(&CacheConfig {
            enabled: true,
            ..CacheConfig::default()
        });
        assert!(cache.connect());
        cache
    }

    #[test]
    fn set_get_delete() {
        let cache = connected_cache();
        assert_that!(cache.get("a")).is_ok_containing(None::<Vec<u8>>);

        cache.set("a", b"one", TTL).unwrap();
        assert_that!(cache.get("a")).is_ok_containing(Some(b"one".to_vec()));

        cache.set("a", b"two", TTL).unwrap();
        assert_that!(cache.get("a")).is_ok_containing(Some(b"two".to_vec()));

        cache.delete("a").unwrap();
        assert_that!(cache.get("a")).is_ok_containing(None::<Vec<u8>>);
        assert_that!(cache.delete("a")).is_ok();
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = connected_cache();
        cache.set("short", b"v", Duration::from_millis(20)).unwrap();
        cache.set("long", b"v", TTL).unwrap();

        sleep(Duration::from_millis(60));

        assert_that!(cache.get("short")).is_ok_containing(None::<Vec<u8>>);
        assert_that!(cache.get("long")).is_ok_containing(Some(b"v".to_vec()));
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let cache = connected_cache();
        cache.set("a", b"v", Duration::from_millis(10)).unwrap();
        cache.set("b", b"v", Duration::from_millis(10)).unwrap();
        cache.set("c", b"v", TTL).unwrap();

        sleep(Duration::from_millis(40));

        assert_that!(cache.purge_expired()).is_ok_containing(2usize);
        assert_that!(cache.len()).is_ok_containing(1usize);
    }

    #[test]
    fn disabled_cache_never_connects() {
        let cache = InMemoryCache::new(&CacheConfig::default());
        assert_that!(cache.connect()).is_false();
        assert_that!(cache.is_connected()).is_false();
        assert_that!(cache.get("a")).is_err_containing(StoreError::Unavailable);
        assert_that!(cache.set("a", b"v", TTL)).is_err_containing(StoreError::Unavailable);
        assert_that!(cache.delete("a")).is_err_containing(StoreError::Unavailable);
    }

    #[test]
    fn disconnect_drops_entries() {
        let cache = connected_cache();
        cache.set("a", b"v", TTL).unwrap();

        cache.disconnect();
        assert_that!(cache.is_connected()).is_false();
        assert_that!(cache.get("a")).is_err_containing(StoreError::Unavailable);

        assert!(cache.connect());
        assert_that!(cache.is_empty()).is_ok_containing(true);
    }

    #[test]
    fn ttl_past_the_clock_range_is_a_backend_error() {
        let cache = connected_cache();
        assert_that!(cache.set("a", b"v", Duration::MAX)).is_err_containing(StoreError::Backend(
            format!("TTL of {:?} is out of range", Duration::MAX),
        ));
        assert_that!(cache.get("a")).is_ok_containing(None::<Vec<u8>>);
    }

    #[test]
    fn poisoned_lock_is_reported_and_cleared_on_disconnect() {
        let cache = Arc::new(connected_cache());
        cache.set("a", b"v", TTL).unwrap();

        let holder = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = holder.entries.lock().unwrap();
            panic!("panic while holding the cache lock");
        })
        .join();

        assert_that!(cache.len()).is_err();
        assert_that!(cache.is_empty()).is_err();
        assert_that!(cache.get("a")).is_err();

        cache.disconnect();
        let entries = match cache.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        assert_that!(entries.is_empty()).is_true();
    }
}
