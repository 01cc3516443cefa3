//! Store contract shared by every cache tier.
//!
//! A store is a dumb keyed envelope container; all freshness interpretation,
//! promotion and deduplication live above it. Implementations must be safe to
//! share between namespaces behind an `Arc`.

mod memory;
#[cfg(feature = "redis-store")]
mod redis;
#[cfg(feature = "sqlite-store")]
mod sqlite;

pub use memory::{MemoryStore, MemoryStoreConfig, UnstableEvictOnSet};
#[cfg(feature = "redis-store")]
pub use redis::RedisStore;
#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::value::{CacheValue, SetOptions};
use crate::Result;

/// Capability surface consumed by the tiered cache.
///
/// Failure semantics at this layer: transient I/O errors propagate as
/// [`Error::Store`](crate::Error::Store) (implementations wrap their own
/// name), a miss is never an error.
#[async_trait]
pub trait Store: Send + Sync {
    /// Stable identifier, used in error messages and to skip the originating
    /// store when promoting a hit across tiers.
    fn name(&self) -> &str;

    /// Reads one entry. A miss is `Ok(None)`.
    async fn get(&self, ns: &str, key: &str) -> Result<Option<CacheValue>>;

    /// Reads a batch of entries in one round trip.
    ///
    /// Only hits are returned, each with `found = true`; order is
    /// unspecified.
    async fn get_many(&self, ns: &str, keys: &[String]) -> Result<Vec<CacheValue>>;

    /// Writes one entry.
    async fn set(&self, ns: &str, key: &str, value: CacheValue) -> Result<()>;

    /// Writes a batch of entries. `opts` are advisory; stores may ignore
    /// them.
    async fn set_many(
        &self,
        ns: &str,
        values: Vec<CacheValue>,
        opts: Option<&SetOptions>,
    ) -> Result<()>;

    /// Removes a batch of keys. Removing an absent key is not an error.
    async fn remove(&self, ns: &str, keys: &[String]) -> Result<()>;
}

/// Builds the persisted key form, `"<namespace>::<key>"`.
///
/// Every store must prefix keys this way on the wire and strip the prefix
/// again before returning envelopes.
pub fn store_key(ns: &str, key: &str) -> String {
    format!("{ns}::{key}")
}

/// Strips the namespace prefix from a persisted key.
pub fn user_key<'a>(ns: &'a str, key: &'a str) -> &'a str {
    key.strip_prefix(ns)
        .and_then(|rest| rest.strip_prefix("::"))
        .unwrap_or(key)
}
