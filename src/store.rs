use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Why a store call could not be completed.
///
/// Store implementations return this instead of panicking or blocking; [crate::FlagRepository]
/// turns every `StoreError` into "absent" and logs it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store is disabled, disconnected, or unreachable.
    #[error("store unavailable")]
    Unavailable,
    /// The store was reachable but the operation failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// CacheStore is the hot read-through tier for serialized flag definitions.
///
/// Entries expire on their own after the TTL given to [CacheStore::set]. Implementations backed
/// by a network service must apply their own connect and operation timeouts and report a
/// timeout as [StoreError::Unavailable].
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Returns true while the cache is connected and serving requests.
    fn is_connected(&self) -> bool;
}

/// DurableStore is the authoritative, hierarchical key-value store for flag definitions.
///
/// Names passed in are relative to the store's configured namespace. The same timeout
/// requirements as [CacheStore] apply.
pub trait DurableStore: Send + Sync {
    fn get(&self, name: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write `value` under `name`, overwriting any existing value.
    fn put(&self, name: &str, value: &[u8], description: &str) -> StoreResult<()>;

    /// Remove `name`. Returns false when nothing was stored under it.
    fn delete(&self, name: &str) -> StoreResult<bool>;

    /// List every entry under the path `prefix` (recursively), keyed by name relative to the
    /// namespace. `prefix` matches whole path segments, and an empty prefix lists the whole
    /// namespace.
    fn list(&self, prefix: &str) -> StoreResult<BTreeMap<String, Vec<u8>>>;

    /// Returns true when the store is enabled and connected.
    fn is_enabled(&self) -> bool;
}
