use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};

use crate::config::ParameterStoreConfig;
use crate::store::{DurableStore, StoreError, StoreResult};

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub value: Vec<u8>,
    pub description: String,
}

/// In-process hierarchical parameter store implementing [DurableStore].
///
/// Every name is stored under `{prefix}/{name}`, so several stores with different prefixes
/// can share one backing map without seeing each other's entries.
pub struct InMemoryParameterStore {
    enabled: bool,
    prefix: String,
    connected: AtomicBool,
    parameters: RwLock<BTreeMap<String, Parameter>>,
}

impl InMemoryParameterStore {
    pub fn new(config: &ParameterStoreConfig) -> Self {
        InMemoryParameterStore {
            enabled: config.enabled,
            prefix: config.prefix.trim_end_matches('/').to_string(),
            connected: AtomicBool::new(false),
            parameters: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn connect(&self) -> bool {
        if !self.enabled {
            info!("Parameter store is disabled");
            return false;
        }
        self.connected.store(true, Ordering::SeqCst);
        info!("Connected to parameter store under {}", self.prefix);
        true
    }

    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Disconnected from parameter store");
        }
    }

    /// The stored parameter, including its description, looked up by namespace-relative name.
    pub fn parameter(&self, name: &str) -> StoreResult<Option<Parameter>> {
        Ok(self.read()?.get(&self.full_name(name)).cloned())
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Parameter>>> {
        if !self.is_enabled() {
            return Err(StoreError::Unavailable);
        }
        self.parameters
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Parameter>>> {
        if !self.is_enabled() {
            return Err(StoreError::Unavailable);
        }
        self.parameters
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

impl DurableStore for InMemoryParameterStore {
    fn get(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let parameter = self.parameter(name)?;
        if parameter.is_none() {
            debug!("Parameter not found: {}", name);
        }
        Ok(parameter.map(|p| p.value))
    }

    fn put(&self, name: &str, value: &[u8], description: &str) -> StoreResult<()> {
        self.write()?.insert(
            self.full_name(name),
            Parameter {
                value: value.to_vec(),
                description: description.to_string(),
            },
        );
        info!("Parameter saved: {}", name);
        Ok(())
    }

    fn delete(&self, name: &str) -> StoreResult<bool> {
        let removed = self.write()?.remove(&self.full_name(name)).is_some();
        if removed {
            info!("Parameter deleted: {}", name);
        } else {
            debug!("Parameter not found for deletion: {}", name);
        }
        Ok(removed)
    }

    fn list(&self, prefix: &str) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        let namespace = format!("{}/", self.prefix);
        // Paths match whole segments: "team" lists "team/..." but not "teamx/...".
        let search = match prefix.trim_matches('/') {
            "" => namespace.clone(),
            path => format!("{}{}/", namespace, path),
        };
        let parameters = self.read()?;
        Ok(parameters
            .range(search.clone()..)
            .take_while(|(name, _)| name.starts_with(&search))
            .filter_map(|(name, parameter)| {
                name.strip_prefix(&namespace)
                    .map(|relative| (relative.to_string(), parameter.value.clone()))
            })
            .collect())
    }

    fn is_enabled(&self) -> bool {
        self.enabled && self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use spectral::prelude::*;

    fn connected_store(prefix: &str) -> InMemoryParameterStore {
        let store = InMemoryParameterStore::new(&ParameterStoreConfig {
            enabled: true,
            prefix: prefix.to_string(),
        });
        assert!(store.connect());
        store
    }

    #[test]
    fn put_get_delete() {
        let store = connected_store("/feature-flags");
        assert_that!(store.get("f1")).is_ok_containing(None::<Vec<u8>>);

        store.put("f1", b"{}", "Feature flag: f1").unwrap();
        assert_that!(store.get("f1")).is_ok_containing(Some(b"{}".to_vec()));
        assert_that!(store.parameter("f1")).is_ok_containing(Some(Parameter {
            value: b"{}".to_vec(),
            description: "Feature flag: f1".to_string(),
        }));

        assert_that!(store.delete("f1")).is_ok_containing(true);
        assert_that!(store.delete("f1")).is_ok_containing(false);
        assert_that!(store.get("f1")).is_ok_containing(None::<Vec<u8>>);
    }

    #[test]
    fn list_is_recursive_and_relative_to_namespace() {
        let store = connected_store("/feature-flags/");
        store.put("a", b"1", "").unwrap();
        store.put("team/b", b"2", "").unwrap();
        store.put("team/c/d", b"3", "").unwrap();

        assert_that!(store.list("")).is_ok_containing(btreemap! {
            "a".to_string() => b"1".to_vec(),
            "team/b".to_string() => b"2".to_vec(),
            "team/c/d".to_string() => b"3".to_vec(),
        });
        assert_that!(store.list("team/")).is_ok_containing(btreemap! {
            "team/b".to_string() => b"2".to_vec(),
            "team/c/d".to_string() => b"3".to_vec(),
        });
        assert_that!(store.list("missing")).is_ok_containing(BTreeMap::<String, Vec<u8>>::new());
    }

    #[test]
    fn list_matches_whole_path_segments() {
        let store = connected_store("/feature-flags");
        store.put("team/a", b"1", "").unwrap();
        store.put("teamx/b", b"2", "").unwrap();
        store.put("team", b"3", "").unwrap();

        let expected = btreemap! { "team/a".to_string() => b"1".to_vec() };
        assert_that!(store.list("team")).is_ok_containing(expected.clone());
        assert_that!(store.list("/team/")).is_ok_containing(expected);
    }

    #[test]
    fn list_does_not_cross_namespaces() {
        let store = connected_store("/feature-flags");
        store.put("a", b"1", "").unwrap();
        store
            .parameters
            .write()
            .unwrap()
            .insert("/feature-flags-other/b".to_string(), Parameter {
                value: b"2".to_vec(),
                description: String::new(),
            });

        assert_that!(store.list("")).is_ok_containing(btreemap! {
            "a".to_string() => b"1".to_vec(),
        });
    }

    #[test]
    fn disabled_store_is_unavailable() {
        let store = InMemoryParameterStore::new(&ParameterStoreConfig::default());
        assert_that!(store.connect()).is_false();
        assert_that!(store.is_enabled()).is_false();
        assert_that!(store.get("f1")).is_err_containing(StoreError::Unavailable);
        assert_that!(store.put("f1", b"v", "")).is_err_containing(StoreError::Unavailable);
        assert_that!(store.delete("f1")).is_err_containing(StoreError::Unavailable);
        assert_that!(store.list("")).is_err_containing(StoreError::Unavailable);
    }

    #[test]
    fn values_survive_reconnect() {
        let store = connected_store("/feature-flags");
        store.put("f1", b"v", "").unwrap();
        store.disconnect();
        assert_that!(store.get("f1")).is_err_containing(StoreError::Unavailable);
        assert!(store.connect());
        assert_that!(store.get("f1")).is_ok_containing(Some(b"v".to_vec()));
    }
}
