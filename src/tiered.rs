//! Tiered composition over an ordered list of stores.
//!
//! Reads walk the stores fastest-first and promote the first hit into every
//! other tier, reusing the hit's envelope so the original fresh/stale clock
//! survives promotion. Writes and removes fan out across all tiers in list
//! order, aborting on the first failure; partial writes are possible and are
//! the caller's to reconcile.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Error;
use crate::store::Store;
use crate::value::{time_after, CacheValue, SetOptions};
use crate::Result;

pub(crate) struct TieredCache<T> {
    stores: Vec<Arc<dyn Store>>,
    ns: String,
    fresh: Duration,
    stale: Duration,
    _payload: PhantomData<T>,
}

impl<T> Clone for TieredCache<T> {
    fn clone(&self) -> Self {
        TieredCache {
            stores: self.stores.clone(),
            ns: self.ns.clone(),
            fresh: self.fresh,
            stale: self.stale,
            _payload: PhantomData,
        }
    }
}

impl<T: Serialize> TieredCache<T> {
    pub(crate) fn new(
        ns: impl Into<String>,
        stores: Vec<Arc<dyn Store>>,
        fresh: Duration,
        stale: Duration,
    ) -> Self {
        TieredCache {
            stores,
            ns: ns.into(),
            fresh,
            stale,
            _payload: PhantomData,
        }
    }

    /// Stamps the two-phase clock once per write call.
    fn stamp(&self, now: DateTime<Utc>, opts: Option<&SetOptions>) -> (DateTime<Utc>, DateTime<Utc>) {
        let fresh = SetOptions::resolve(opts.and_then(|o| o.fresh), self.fresh);
        let stale = SetOptions::resolve(opts.and_then(|o| o.stale), self.stale);
        (time_after(now, fresh), time_after(now, stale))
    }

    fn encode(&self, payload: Option<&T>) -> Result<Option<serde_json::Value>> {
        match payload {
            Some(payload) => serde_json::to_value(payload)
                .map(Some)
                .map_err(Error::decode),
            None => Ok(None),
        }
    }

    /// Read-through with promotion.
    ///
    /// The first store holding a payload wins; the envelope is then written
    /// unchanged into every other store. Store errors abort the walk and are
    /// never masked as misses.
    pub(crate) async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        if self.stores.is_empty() {
            return Err(Error::NoStores);
        }

        for store in &self.stores {
            let Some(value) = store.get(&self.ns, key).await? else {
                continue;
            };
            if value.value.is_none() {
                continue;
            }

            tracing::trace!(store = store.name(), key, "tier hit, promoting");
            for other in &self.stores {
                if other.name() == store.name() {
                    continue;
                }
                other.set(&self.ns, key, value.clone()).await?;
            }

            return Ok(Some(value));
        }

        Ok(None)
    }

    /// Batch read-through: at most one round trip per store.
    ///
    /// Each store is asked only for the keys still missing; whatever a store
    /// contributed is fanned into every other store before moving on. The
    /// result is assembled in input order with synthetic miss envelopes for
    /// keys no tier held.
    pub(crate) async fn get_many(&self, keys: &[String]) -> Result<Vec<CacheValue>> {
        if self.stores.is_empty() {
            return Err(Error::NoStores);
        }

        let mut keys_to_find: Vec<String> = keys.to_vec();
        let mut found_values: HashMap<String, CacheValue> = HashMap::new();

        for store in &self.stores {
            if keys_to_find.is_empty() {
                break;
            }

            let values = store.get_many(&self.ns, &keys_to_find).await?;

            let mut values_to_set = Vec::new();
            for value in values {
                if !value.found {
                    continue;
                }
                keys_to_find.retain(|k| k != &value.key);
                values_to_set.push(value.clone());
                found_values.insert(value.key.clone(), value);
            }

            if !values_to_set.is_empty() {
                tracing::trace!(
                    store = store.name(),
                    hits = values_to_set.len(),
                    "batch tier hits, promoting"
                );
                for other in &self.stores {
                    if other.name() == store.name() {
                        continue;
                    }
                    other
                        .set_many(&self.ns, values_to_set.clone(), None)
                        .await?;
                }
            }
        }

        let mut values_to_return = Vec::with_capacity(keys.len());
        for key in keys {
            match found_values.get(key) {
                Some(value) => values_to_return.push(value.clone()),
                None => values_to_return.push(CacheValue::miss(key.clone())),
            }
        }
        Ok(values_to_return)
    }

    /// Write fan-out. The clock is stamped once, then every store receives
    /// the same envelope; the first failing store aborts the fan-out.
    pub(crate) async fn set(
        &self,
        key: &str,
        payload: Option<&T>,
        opts: Option<&SetOptions>,
    ) -> Result<()> {
        if self.stores.is_empty() {
            return Err(Error::NoStores);
        }

        let (fresh_until, stale_until) = self.stamp(Utc::now(), opts);
        let value = CacheValue::new(key, self.encode(payload)?, fresh_until, stale_until);

        for store in &self.stores {
            store.set(&self.ns, key, value.clone()).await?;
        }
        Ok(())
    }

    /// Batch write fan-out; all envelopes share one `now`.
    pub(crate) async fn set_many(
        &self,
        entries: &[(String, Option<T>)],
        opts: Option<&SetOptions>,
    ) -> Result<()> {
        if self.stores.is_empty() {
            return Err(Error::NoStores);
        }

        let (fresh_until, stale_until) = self.stamp(Utc::now(), opts);
        let mut values = Vec::with_capacity(entries.len());
        for (key, payload) in entries {
            values.push(CacheValue::new(
                key.clone(),
                self.encode(payload.as_ref())?,
                fresh_until,
                stale_until,
            ));
        }

        for store in &self.stores {
            store.set_many(&self.ns, values.clone(), opts).await?;
        }
        Ok(())
    }

    /// Remove fan-out in list order; the first failing store aborts.
    pub(crate) async fn remove(&self, keys: &[String]) -> Result<()> {
        if self.stores.is_empty() {
            return Err(Error::NoStores);
        }

        for store in &self.stores {
            store.remove(&self.ns, keys).await?;
        }
        Ok(())
    }
}
