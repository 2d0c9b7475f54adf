#![cfg(test)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::{CacheConfig, ParameterStoreConfig, RepositoryConfig};
use crate::flag::{FeatureFlag, NewFlag};
use crate::rule::RolloutRule;
use crate::store::{CacheStore, DurableStore, StoreError, StoreResult};
use crate::{FlagRepository, InMemoryCache, InMemoryParameterStore};

pub fn at(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn flag(key: &str, rule: RolloutRule) -> FeatureFlag {
    NewFlag::new(key)
        .rule(rule)
        .into_flag(at("2024-01-01T00:00:00Z"))
}

pub fn disabled_flag(key: &str, rule: RolloutRule) -> FeatureFlag {
    NewFlag::new(key)
        .enabled(false)
        .rule(rule)
        .into_flag(at("2024-01-01T00:00:00Z"))
}

pub fn flag_with_metadata() -> FeatureFlag {
    let metadata = json!({"team": "payments"}).as_object().cloned().unwrap();
    let mut flag = NewFlag::new("checkout")
        .description("New checkout flow")
        .rule(RolloutRule::user_list(["user1", "user2"]))
        .metadata(metadata)
        .into_flag(at("2024-01-01T00:00:00Z"));
    flag.touch(at("2024-01-02T00:00:00Z"));
    flag
}

pub fn enabled_config() -> RepositoryConfig {
    RepositoryConfig {
        cache: CacheConfig {
            enabled: true,
            ..CacheConfig::default()
        },
        store: ParameterStoreConfig {
            enabled: true,
            ..ParameterStoreConfig::default()
        },
    }
}

/// A repository over connected in-memory stores, with handles to both stores.
pub struct Harness {
    pub cache: Arc<InMemoryCache>,
    pub store: Arc<InMemoryParameterStore>,
    pub repository: FlagRepository,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(enabled_config())
    }

    pub fn with_config(config: RepositoryConfig) -> Self {
        let cache = Arc::new(InMemoryCache::new(&config.cache));
        let store = Arc::new(InMemoryParameterStore::new(&config.store));
        cache.connect();
        store.connect();
        let repository = FlagRepository::new(cache.clone(), store.clone(), &config.cache);
        Harness {
            cache,
            store,
            repository,
        }
    }
}

/// A cache that is always unreachable and counts how often it was asked.
#[derive(Default)]
pub struct UnreachableCache {
    pub calls: AtomicUsize,
}

impl UnreachableCache {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> StoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("connection refused".into()))
    }
}

impl CacheStore for UnreachableCache {
    fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.fail()
    }

    fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> StoreResult<()> {
        self.fail()
    }

    fn delete(&self, _key: &str) -> StoreResult<()> {
        self.fail()
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// A durable store that serves reads but fails every write.
pub struct ReadOnlyStore {
    pub inner: InMemoryParameterStore,
}

impl DurableStore for ReadOnlyStore {
    fn get(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(name)
    }

    fn put(&self, _name: &str, _value: &[u8], _description: &str) -> StoreResult<()> {
        Err(StoreError::Backend("access denied".into()))
    }

    fn delete(&self, _name: &str) -> StoreResult<bool> {
        Err(StoreError::Backend("access denied".into()))
    }

    fn list(&self, prefix: &str) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        self.inner.list(prefix)
    }

    fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }
}
