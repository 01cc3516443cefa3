//! Shared helpers for the integration suite.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tiercache::{
    Cacheable, CacheValue, MemoryStore, Namespace, NamespaceConfig, Result, SetOptions, Store,
};

/// An in-memory tier with a configurable name, so tests can stack several
/// and the promotion logic can tell them apart.
pub struct NamedMemoryStore {
    name: &'static str,
    inner: MemoryStore,
}

impl NamedMemoryStore {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(NamedMemoryStore {
            name,
            inner: MemoryStore::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl Store for NamedMemoryStore {
    fn name(&self) -> &str {
        self.name
    }

    async fn get(&self, ns: &str, key: &str) -> Result<Option<CacheValue>> {
        self.inner.get(ns, key).await
    }

    async fn get_many(&self, ns: &str, keys: &[String]) -> Result<Vec<CacheValue>> {
        self.inner.get_many(ns, keys).await
    }

    async fn set(&self, ns: &str, key: &str, value: CacheValue) -> Result<()> {
        self.inner.set(ns, key, value).await
    }

    async fn set_many(
        &self,
        ns: &str,
        values: Vec<CacheValue>,
        opts: Option<&SetOptions>,
    ) -> Result<()> {
        self.inner.set_many(ns, values, opts).await
    }

    async fn remove(&self, ns: &str, keys: &[String]) -> Result<()> {
        self.inner.remove(ns, keys).await
    }
}

/// Builds a namespace over the given tiers.
pub fn namespace<T: Cacheable>(
    name: &str,
    stores: Vec<Arc<dyn Store>>,
    fresh: Duration,
    stale: Duration,
) -> Namespace<T> {
    Namespace::new(name, NamespaceConfig::new(stores, fresh, stale))
}

pub fn keys(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|k| k.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new(name: &str, email: &str) -> Self {
        User {
            name: name.to_string(),
            email: email.to_string(),
        }
    }
}
