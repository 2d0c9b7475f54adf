use std::sync::Arc;

use chrono::Utc;
use itertools::Itertools;
use log::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::eval::{self, EvaluationContext, EvaluationResult, Resolved, Source};
use crate::flag::{FeatureFlag, FlagUpdate, NewFlag};
use crate::store::{CacheStore, DurableStore};

/// FlagRepository reads and writes flags through a cache in front of a durable store.
///
/// The durable store is the only source of truth. The cache is filled on reads, filled on
/// create, and invalidated on update and delete. Store failures are logged and treated as
/// absence, so the repository keeps answering, only more slowly, while the cache is down,
/// and answers "no such flag" while the durable store is down.
///
/// There is no locking around mutations: two concurrent creates of the same key can both
/// pass the existence check, and the last write to the durable store wins.
pub struct FlagRepository {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn DurableStore>,
    cache_config: CacheConfig,
}

impl FlagRepository {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        store: Arc<dyn DurableStore>,
        config: &CacheConfig,
    ) -> Self {
        FlagRepository {
            cache,
            store,
            cache_config: config.clone(),
        }
    }

    /// Create a flag, stamping both timestamps with the current time.
    ///
    /// Fails with [Error::AlreadyExists] when the key already resolves. Persisting and
    /// caching are best-effort: the new flag is returned even if neither write succeeded.
    pub fn create(&self, new_flag: NewFlag) -> Result<FeatureFlag> {
        FeatureFlag::validate_key(&new_flag.key)?;
        if self.resolve(&new_flag.key).is_some() {
            return Err(Error::AlreadyExists(new_flag.key));
        }

        let flag = new_flag.into_flag(Utc::now());
        let persisted = self.write_store(&flag);
        self.write_cache(&flag);

        info!("Created feature flag: {} (persisted: {})", flag.key(), persisted);
        Ok(flag)
    }

    /// Look a flag up, reporting which tier answered.
    ///
    /// A cache miss falls through to the durable store, and a store hit is written back to
    /// the cache.
    pub fn resolve(&self, key: &str) -> Option<Resolved> {
        if let Some(flag) = self.read_cache(key) {
            return Some(Resolved {
                flag,
                source: Source::Cache,
            });
        }

        let flag = self.read_store(key)?;
        self.write_cache(&flag);
        Some(Resolved {
            flag,
            source: Source::Store,
        })
    }

    pub fn get(&self, key: &str) -> Option<FeatureFlag> {
        self.resolve(key).map(|resolved| resolved.flag)
    }

    /// Like [FlagRepository::get], but a missing flag is an [Error::NotFound].
    pub fn require(&self, key: &str) -> Result<FeatureFlag> {
        self.get(key).ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Apply `update` to an existing flag and refresh `updated_at`.
    ///
    /// The cached copy is invalidated rather than overwritten, so a failed store write is
    /// never masked by a fresh cache entry. Returns None when the flag does not exist.
    pub fn update(&self, key: &str, update: FlagUpdate) -> Option<FeatureFlag> {
        let mut flag = self.get(key)?;
        update.apply(&mut flag, Utc::now());

        let persisted = self.write_store(&flag);
        self.invalidate_cache(key);

        info!("Updated feature flag: {} (persisted: {})", key, persisted);
        Some(flag)
    }

    /// Remove a flag from both tiers. Returns false when the flag does not exist.
    pub fn delete(&self, key: &str) -> bool {
        if self.resolve(key).is_none() {
            return false;
        }

        let removed = self.delete_from_store(key);
        self.invalidate_cache(key);

        info!("Deleted feature flag: {} (removed from store: {})", key, removed);
        true
    }

    /// Every flag in the durable store, ordered by key.
    ///
    /// The cache cannot enumerate keys, so this is empty while the durable store is
    /// unavailable. Entries that fail to parse are logged and skipped.
    pub fn list(&self) -> Vec<FeatureFlag> {
        if !self.store.is_enabled() {
            return Vec::new();
        }

        let entries = match self.store.list("") {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Error listing flags: {}", e);
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|(name, value)| match serde_json::from_slice::<FeatureFlag>(&value) {
                Ok(flag) => Some(flag),
                Err(e) => {
                    error!("Error parsing flag {}: {}", name, e);
                    None
                }
            })
            .sorted_by(|a, b| a.key().cmp(b.key()))
            .collect()
    }

    /// Resolve `key` and evaluate it for `subject_id`. See [eval::evaluate].
    pub fn evaluate(
        &self,
        key: &str,
        subject_id: Option<&str>,
        context: Option<&EvaluationContext>,
    ) -> EvaluationResult {
        let resolved = self.resolve(key);
        eval::evaluate(key, resolved.as_ref(), subject_id, context)
    }

    fn read_cache(&self, key: &str) -> Option<FeatureFlag> {
        if !self.cache.is_connected() {
            return None;
        }

        let data = match self.cache.get(&self.cache_config.cache_key(key)) {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!("Cache miss for flag: {}", key);
                return None;
            }
            Err(e) => {
                warn!("Cache read error for flag {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(flag) => {
                debug!("Cache hit for flag: {}", key);
                Some(flag)
            }
            Err(e) => {
                error!("Error parsing cached flag {}: {}", key, e);
                None
            }
        }
    }

    fn write_cache(&self, flag: &FeatureFlag) -> bool {
        if !self.cache.is_connected() {
            return false;
        }

        let result = serde_json::to_vec(flag)
            .map_err(|e| e.to_string())
            .and_then(|data| {
                self.cache
                    .set(
                        &self.cache_config.cache_key(flag.key()),
                        &data,
                        self.cache_config.ttl,
                    )
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => {
                debug!("Cached flag: {}", flag.key());
                true
            }
            Err(e) => {
                warn!("Cache write error for flag {}: {}", flag.key(), e);
                false
            }
        }
    }

    fn invalidate_cache(&self, key: &str) -> bool {
        if !self.cache.is_connected() {
            return false;
        }

        match self.cache.delete(&self.cache_config.cache_key(key)) {
            Ok(()) => {
                debug!("Invalidated cache for flag: {}", key);
                true
            }
            Err(e) => {
                warn!("Cache invalidation error for flag {}: {}", key, e);
                false
            }
        }
    }

    fn read_store(&self, key: &str) -> Option<FeatureFlag> {
        if !self.store.is_enabled() {
            return None;
        }

        let data = match self.store.get(key) {
            Ok(data) => data?,
            Err(e) => {
                warn!("Store read error for flag {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(flag) => {
                debug!("Store hit for flag: {}", key);
                Some(flag)
            }
            Err(e) => {
                error!("Error parsing stored flag {}: {}", key, e);
                None
            }
        }
    }

    fn write_store(&self, flag: &FeatureFlag) -> bool {
        if !self.store.is_enabled() {
            return false;
        }

        let description = match flag.description() {
            Some(description) => description.to_string(),
            None => format!("Feature flag: {}", flag.key()),
        };
        let result = serde_json::to_vec(flag)
            .map_err(|e| e.to_string())
            .and_then(|data| {
                self.store
                    .put(flag.key(), &data, &description)
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Store write error for flag {}: {}", flag.key(), e);
                false
            }
        }
    }

    fn delete_from_store(&self, key: &str) -> bool {
        if !self.store.is_enabled() {
            return false;
        }

        match self.store.delete(key) {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Store delete error for flag {}: {}", key, e);
                false
            }
        }
    }
}
