//! Typed namespace front-end with stale-while-revalidate semantics.
//!
//! A [`Namespace`] binds a payload type `T` to a tiered store chain and a
//! pair of default durations. Reads interpret the envelope's two-phase
//! clock; [`Namespace::swr`] additionally coalesces concurrent origin
//! refreshes for the same key into a single in-flight call whose result is
//! broadcast to every waiter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::Instrument;

use crate::error::Error;
use crate::store::Store;
use crate::telemetry;
use crate::tiered::TieredCache;
use crate::utils::CallOnDrop;
use crate::value::SetOptions;
use crate::Result;

/// Marker for types a namespace can cache.
///
/// Blanket-implemented; payloads only need `Clone` + serde both ways and the
/// usual thread-safety bounds (refresh results are broadcast across tasks).
pub trait Cacheable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// One entry of a batch read or batch revalidation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry<T> {
    pub key: String,
    pub value: Option<T>,
    pub found: bool,
}

impl<T> BatchEntry<T> {
    pub fn hit(key: impl Into<String>, value: T) -> Self {
        BatchEntry {
            key: key.into(),
            value: Some(value),
            found: true,
        }
    }

    pub fn miss(key: impl Into<String>) -> Self {
        BatchEntry {
            key: key.into(),
            value: None,
            found: false,
        }
    }
}

/// One entry of a batch write.
#[derive(Debug, Clone)]
pub struct SetEntry<T> {
    pub key: String,
    pub value: T,
}

impl<T> SetEntry<T> {
    pub fn new(key: impl Into<String>, value: T) -> Self {
        SetEntry {
            key: key.into(),
            value,
        }
    }
}

/// Configuration for a namespace: the ordered store chain (fastest first)
/// and the default fresh/stale durations.
#[derive(Clone)]
pub struct NamespaceConfig {
    pub stores: Vec<Arc<dyn Store>>,
    pub fresh: Duration,
    pub stale: Duration,
    pub telemetry: bool,
}

impl NamespaceConfig {
    pub fn new(stores: Vec<Arc<dyn Store>>, fresh: Duration, stale: Duration) -> Self {
        NamespaceConfig {
            stores,
            fresh,
            stale,
            telemetry: false,
        }
    }

    pub fn with_telemetry(mut self, telemetry: bool) -> Self {
        self.telemetry = telemetry;
        self
    }
}

/// Result broadcast to everyone waiting on one in-flight refresh.
type SingleFlight<T> = Shared<oneshot::Receiver<Result<Option<T>>>>;
type BatchFlight<T> = Shared<oneshot::Receiver<Result<Vec<BatchEntry<T>>>>>;

type FlightMap<C> = Arc<Mutex<HashMap<String, C>>>;

/// Typed front-end over a tiered store chain.
///
/// Cloning is cheap and clones share the in-flight revalidation tables, so
/// concurrent calls on clones still deduplicate against each other.
pub struct Namespace<T: Cacheable> {
    ns: String,
    telemetry: bool,
    store: TieredCache<T>,
    revalidating: FlightMap<SingleFlight<T>>,
    revalidating_many: FlightMap<BatchFlight<T>>,
}

impl<T: Cacheable> Clone for Namespace<T> {
    fn clone(&self) -> Self {
        Namespace {
            ns: self.ns.clone(),
            telemetry: self.telemetry,
            store: self.store.clone(),
            revalidating: Arc::clone(&self.revalidating),
            revalidating_many: Arc::clone(&self.revalidating_many),
        }
    }
}

impl<T: Cacheable> Namespace<T> {
    pub fn new(ns: impl Into<String>, config: NamespaceConfig) -> Self {
        let ns = ns.into();
        Namespace {
            store: TieredCache::new(ns.clone(), config.stores, config.fresh, config.stale),
            telemetry: config.telemetry,
            revalidating: Arc::new(Mutex::new(HashMap::new())),
            revalidating_many: Arc::new(Mutex::new(HashMap::new())),
            ns,
        }
    }

    pub fn name(&self) -> &str {
        &self.ns
    }

    /// Reads a value, honoring only the stale deadline.
    ///
    /// An entry past `stale_until` is treated as a miss and removed from the
    /// whole tier chain; a failure to remove it is returned instead of the
    /// phantom value. `fresh_until` is not consulted here; callers that care
    /// about freshness use [`Namespace::swr`].
    pub async fn get(&self, key: &str) -> Result<Option<T>> {
        let span = telemetry::op_span(self.telemetry, "namespace.get", &self.ns);
        span.record("key", key);

        async {
            let Some(value) = self.store.get(key).await? else {
                return Ok(None);
            };
            if value.value.is_none() {
                return Ok(None);
            }

            if value.is_expired(Utc::now()) {
                self.store.remove(std::slice::from_ref(&key.to_string())).await?;
                return Ok(None);
            }

            value.decode_payload::<T>()
        }
        .instrument(span)
        .await
    }

    /// Writes a value through every tier.
    pub async fn set(&self, key: &str, value: &T, opts: Option<SetOptions>) -> Result<()> {
        let span = telemetry::op_span(self.telemetry, "namespace.set", &self.ns);
        span.record("key", key);

        async {
            if key.is_empty() {
                return Err(Error::EmptyKey);
            }
            self.store.set(key, Some(value), opts.as_ref()).await
        }
        .instrument(span)
        .await
    }

    /// Reads a batch of keys in at most one round trip per tier.
    ///
    /// Entries past their stale deadline are scheduled for removal but still
    /// returned; the next read will miss them.
    pub async fn get_many(&self, keys: &[String]) -> Result<Vec<BatchEntry<T>>> {
        let span = telemetry::op_span(self.telemetry, "namespace.get-many", &self.ns);
        span.record("keys", keys.len());

        async {
            if keys.is_empty() {
                return Err(Error::NoKeys);
            }

            let values = self.store.get_many(keys).await?;

            let now = Utc::now();
            let mut entries = Vec::with_capacity(values.len());
            let mut to_remove = Vec::new();

            for value in values {
                if value.value.is_none() {
                    entries.push(BatchEntry {
                        key: value.key,
                        value: None,
                        found: value.found,
                    });
                    continue;
                }

                if value.is_expired(now) {
                    to_remove.push(value.key.clone());
                }

                let decoded = value.decode_payload::<T>()?;
                entries.push(BatchEntry {
                    key: value.key,
                    value: decoded,
                    found: value.found,
                });
            }

            if !to_remove.is_empty() {
                self.store.remove(&to_remove).await?;
            }

            Ok(entries)
        }
        .instrument(span)
        .await
    }

    /// Writes a batch of values; all envelopes share one stamped clock.
    pub async fn set_many(&self, values: Vec<SetEntry<T>>, opts: Option<SetOptions>) -> Result<()> {
        let span = telemetry::op_span(self.telemetry, "namespace.set-many", &self.ns);
        span.record("keys", values.len());

        async {
            if values.is_empty() {
                return Err(Error::NoValues);
            }

            let entries: Vec<(String, Option<T>)> = values
                .into_iter()
                .map(|entry| (entry.key, Some(entry.value)))
                .collect();
            self.store.set_many(&entries, opts.as_ref()).await
        }
        .instrument(span)
        .await
    }

    /// Removes keys from every tier. An empty list is a successful no-op.
    pub async fn remove(&self, keys: &[String]) -> Result<()> {
        let span = telemetry::op_span(self.telemetry, "namespace.remove", &self.ns);
        span.record("keys", keys.len());

        async {
            if keys.is_empty() {
                return Ok(());
            }
            self.store.remove(keys).await
        }
        .instrument(span)
        .await
    }

    /// Stale-while-revalidate read.
    ///
    /// * Fresh hit: the cached value is returned untouched.
    /// * Stale hit (`fresh_until` passed): the origin is refreshed (one
    ///   in-flight call per key, shared by every concurrent caller) and the
    ///   result written through the tiers, but the caller still receives the
    ///   value that was already cached.
    /// * Miss: the deduplicated refresh runs, its result is written through
    ///   the tiers and returned.
    pub async fn swr<F, Fut>(&self, key: &str, refresh_from_origin: F) -> Result<Option<T>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let span = telemetry::op_span(self.telemetry, "namespace.swr", &self.ns);
        span.record("key", key);

        async {
            if key.is_empty() {
                return Err(Error::EmptyKey);
            }

            let value = self.store.get(key).await?;
            let now = Utc::now();

            if let Some(value) = value {
                if now > value.fresh_until {
                    let refreshed = self.deduplicate_load_from_origin(key, refresh_from_origin).await?;
                    self.store.set(key, refreshed.as_ref(), None).await?;
                }
                return value.decode_payload::<T>();
            }

            let refreshed = self.deduplicate_load_from_origin(key, refresh_from_origin).await?;
            self.store.set(key, refreshed.as_ref(), None).await?;
            Ok(refreshed)
        }
        .instrument(span)
        .await
    }

    /// Batch stale-while-revalidate read.
    ///
    /// Keys that miss or are past their stale deadline are refreshed through
    /// one deduplicated origin call. A stale-but-serveable cached value wins
    /// over the origin's in the response; everything collected is written
    /// back through the tiers. Result order is not guaranteed.
    pub async fn swr_many<F, Fut>(
        &self,
        keys: &[String],
        refresh_from_origin: F,
    ) -> Result<Vec<BatchEntry<T>>>
    where
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Result<Vec<BatchEntry<T>>>> + Send + 'static,
    {
        let span = telemetry::op_span(self.telemetry, "namespace.swr-many", &self.ns);
        span.record("keys", keys.len());

        async {
            if keys.is_empty() {
                return Err(Error::NoKeys);
            }

            let values = self.store.get_many(keys).await?;

            let now = Utc::now();
            let mut return_map: HashMap<String, BatchEntry<T>> = HashMap::new();
            let mut keys_to_fetch: Vec<String> = Vec::new();

            for value in values {
                if !value.found {
                    keys_to_fetch.push(value.key);
                    continue;
                }

                if value.is_expired(now) {
                    // Refresh from the origin, but keep serving the value we
                    // already hold.
                    keys_to_fetch.push(value.key.clone());
                }

                let decoded = value.decode_payload::<T>()?;
                return_map.insert(
                    value.key.clone(),
                    BatchEntry {
                        key: value.key,
                        value: decoded,
                        found: true,
                    },
                );
            }

            if !keys_to_fetch.is_empty() {
                let origin = self
                    .deduplicate_load_from_origin_many(keys_to_fetch, refresh_from_origin)
                    .await?;

                for entry in origin {
                    return_map.entry(entry.key.clone()).or_insert(entry);
                }

                let entries: Vec<(String, Option<T>)> = return_map
                    .values()
                    .map(|entry| (entry.key.clone(), entry.value.clone()))
                    .collect();
                self.store.set_many(&entries, None).await?;
            }

            for key in keys {
                if !return_map.contains_key(key) {
                    return_map.insert(key.clone(), BatchEntry::miss(key.clone()));
                }
            }

            Ok(return_map.into_values().collect())
        }
        .instrument(span)
        .await
    }

    /// Runs `refresh_from_origin` once per concurrent cohort on `key`.
    ///
    /// The winning caller installs a shared one-shot channel, spawns the
    /// refresh and publishes its result; everyone else awaits the same
    /// channel. The refresh runs to completion even if all waiters go away,
    /// so a future request on the same key can still be served. The table
    /// entry is cleared (by drop-guard, so panics clear it too) before the
    /// result is published: late arrivals either find a channel that will
    /// produce a value or start a fresh refresh.
    async fn deduplicate_load_from_origin<F, Fut>(
        &self,
        key: &str,
        refresh_from_origin: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let revalidate_key = format!("{}::{}", self.ns, key);

        let channel = {
            let mut revalidating = self.revalidating.lock().unwrap();
            match revalidating.get(&revalidate_key) {
                Some(channel) => channel.clone(),
                None => {
                    let (sender, receiver) = oneshot::channel();
                    let channel = receiver.shared();
                    revalidating.insert(revalidate_key.clone(), channel.clone());

                    let table = Arc::clone(&self.revalidating);
                    let clear_entry = CallOnDrop::new(move || {
                        table.lock().unwrap().remove(&revalidate_key);
                    });

                    let refresh = refresh_from_origin(key.to_string());
                    tokio::spawn(async move {
                        let result = refresh.await;
                        drop(clear_entry);
                        let _ = sender.send(result);
                    });

                    channel
                }
            }
        };

        channel.await.map_err(|_| Error::Cancelled)?
    }

    /// Batch variant of [`Self::deduplicate_load_from_origin`].
    ///
    /// The revalidation key joins the keys in caller order, so the same set
    /// in a different order is a different cohort.
    async fn deduplicate_load_from_origin_many<F, Fut>(
        &self,
        keys: Vec<String>,
        refresh_from_origin: F,
    ) -> Result<Vec<BatchEntry<T>>>
    where
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Result<Vec<BatchEntry<T>>>> + Send + 'static,
    {
        let revalidate_key = format!("{}::{}", self.ns, keys.join(","));

        let channel = {
            let mut revalidating = self.revalidating_many.lock().unwrap();
            match revalidating.get(&revalidate_key) {
                Some(channel) => channel.clone(),
                None => {
                    let (sender, receiver) = oneshot::channel();
                    let channel = receiver.shared();
                    revalidating.insert(revalidate_key.clone(), channel.clone());

                    let table = Arc::clone(&self.revalidating_many);
                    let clear_entry = CallOnDrop::new(move || {
                        table.lock().unwrap().remove(&revalidate_key);
                    });

                    let refresh = refresh_from_origin(keys);
                    tokio::spawn(async move {
                        let result = refresh.await;
                        drop(clear_entry);
                        let _ = sender.send(result);
                    });

                    channel
                }
            }
        };

        channel.await.map_err(|_| Error::Cancelled)?
    }
}
