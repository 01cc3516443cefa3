//! In-memory tier backed by a mutex-guarded map.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{store_key, Store};
use crate::value::{CacheValue, SetOptions};
use crate::Result;

/// Opportunistic eviction applied on writes.
///
/// On each `set`, when a uniform sample exceeds `frequency`, every entry past
/// its stale deadline is purged and the map is then trimmed to `max_items`
/// entries in unspecified order. `frequency = 1.0` disables the pass
/// entirely, `0.0` runs it on every write.
#[derive(Debug, Clone, Copy)]
pub struct UnstableEvictOnSet {
    pub frequency: f64,
    pub max_items: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStoreConfig {
    pub unstable_evict_on_set: Option<UnstableEvictOnSet>,
}

/// Fastest tier: a plain map of persisted keys to envelopes.
///
/// The mutex is never held across an await point.
pub struct MemoryStore {
    config: MemoryStoreConfig,
    state: Mutex<HashMap<String, CacheValue>>,
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        MemoryStore {
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Number of resident entries, expired or not.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, ns: &str, key: &str) -> Result<Option<CacheValue>> {
        let hit = {
            let state = self.state.lock().unwrap();
            state.get(&store_key(ns, key)).cloned()
        };

        let Some(mut value) = hit else {
            return Ok(None);
        };

        // Expired entries are evicted on observation but still handed back;
        // interpreting the deadline is the caller's job.
        if value.is_expired(Utc::now()) {
            self.remove(ns, std::slice::from_ref(&key.to_string())).await?;
        }

        value.key = key.to_string();
        value.found = true;
        Ok(Some(value))
    }

    async fn get_many(&self, ns: &str, keys: &[String]) -> Result<Vec<CacheValue>> {
        let state = self.state.lock().unwrap();
        let mut values = Vec::new();
        for key in keys {
            // Misses are omitted from the result.
            let Some(value) = state.get(&store_key(ns, key)) else {
                continue;
            };
            let mut value = value.clone();
            value.key = key.clone();
            value.found = true;
            values.push(value);
        }
        Ok(values)
    }

    async fn set(&self, ns: &str, key: &str, value: CacheValue) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.insert(store_key(ns, key), value);

        if let Some(policy) = self.config.unstable_evict_on_set {
            if rand::random::<f64>() > policy.frequency {
                let now = Utc::now();
                state.retain(|_, v| !v.is_expired(now));

                while state.len() > policy.max_items {
                    let Some(victim) = state.keys().next().cloned() else {
                        break;
                    };
                    state.remove(&victim);
                }
            }
        }

        Ok(())
    }

    async fn set_many(
        &self,
        ns: &str,
        values: Vec<CacheValue>,
        _opts: Option<&SetOptions>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for value in values {
            let key = store_key(ns, &value.key);
            state.insert(key, value);
        }
        Ok(())
    }

    async fn remove(&self, ns: &str, keys: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for key in keys {
            state.remove(&store_key(ns, key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use serde_json::json;

    fn live_value(key: &str) -> CacheValue {
        let now = Utc::now();
        CacheValue::new(
            key,
            Some(json!(key)),
            now + TimeDelta::minutes(10),
            now + TimeDelta::minutes(10),
        )
    }

    fn expired_value(key: &str) -> CacheValue {
        let now = Utc::now();
        CacheValue::new(
            key,
            Some(json!(key)),
            now - TimeDelta::minutes(10),
            now - TimeDelta::minutes(5),
        )
    }

    #[tokio::test]
    async fn get_returns_expired_entry_but_evicts_it() {
        let store = MemoryStore::default();
        store.set("ns", "k1", expired_value("k1")).await.unwrap();

        let value = store.get("ns", "k1").await.unwrap().unwrap();
        assert!(value.found);
        assert_eq!(value.value, Some(json!("k1")));

        // The observation above removed the entry.
        assert!(store.get("ns", "k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_many_omits_misses() {
        let store = MemoryStore::default();
        store.set("ns", "a", live_value("a")).await.unwrap();
        store.set("ns", "c", live_value("c")).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut values = store.get_many("ns", &keys).await.unwrap();
        values.sort_by(|l, r| l.key.cmp(&r.key));

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].key, "a");
        assert_eq!(values[1].key, "c");
        assert!(values.iter().all(|v| v.found));
    }

    #[tokio::test]
    async fn keys_are_namespaced() {
        let store = MemoryStore::default();
        store.set("users", "k1", live_value("k1")).await.unwrap();

        assert!(store.get("posts", "k1").await.unwrap().is_none());
        assert!(store.get("users", "k1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn frequency_one_never_evicts() {
        let store = MemoryStore::new(MemoryStoreConfig {
            unstable_evict_on_set: Some(UnstableEvictOnSet {
                frequency: 1.0,
                max_items: 1,
            }),
        });

        for i in 0..10 {
            let key = format!("k{i}");
            store.set("ns", &key, live_value(&key)).await.unwrap();
        }
        assert_eq!(store.len(), 10);
    }

    #[tokio::test]
    async fn frequency_zero_purges_expired_and_trims_to_max() {
        let store = MemoryStore::new(MemoryStoreConfig {
            unstable_evict_on_set: Some(UnstableEvictOnSet {
                frequency: 0.0,
                max_items: 3,
            }),
        });

        for i in 0..5 {
            let key = format!("dead{i}");
            store.set("ns", &key, expired_value(&key)).await.unwrap();
        }
        for i in 0..5 {
            let key = format!("live{i}");
            store.set("ns", &key, live_value(&key)).await.unwrap();
        }

        assert!(store.len() <= 3);
    }
}
