//! # tiercache
//!
//! Typed, multi-tier, stale-while-revalidate caching.
//!
//! A [`Namespace`] binds a payload type to an ordered chain of stores
//! (fastest first) and two durations: values are *fresh* until the first
//! deadline, *serveable* until the second, and evicted on observation after
//! that. Reads fall through the chain and promote hits toward the faster
//! tiers; [`Namespace::swr`] refreshes stale entries from the origin while
//! coalescing concurrent refreshes for the same key into a single call.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tiercache::{MemoryStore, Namespace, NamespaceConfig, Store};
//!
//! # #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! # struct User { name: String }
//! # async fn load_user(_key: String) -> tiercache::Result<Option<User>> { Ok(None) }
//! # async fn example() -> tiercache::Result<()> {
//! let memory: Arc<dyn Store> = Arc::new(MemoryStore::default());
//!
//! let users: Namespace<User> = Namespace::new(
//!     "user",
//!     NamespaceConfig::new(
//!         vec![memory],
//!         Duration::from_secs(60),      // fresh
//!         Duration::from_secs(10 * 60), // stale
//!     ),
//! );
//!
//! users.set("u1", &User { name: "Flo".into() }, None).await?;
//! let cached = users.get("u1").await?;
//!
//! // Serves from cache while it is fresh, refreshes once it is stale.
//! let user = users.swr("u2", |key| load_user(key)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Store backends are pluggable behind the [`Store`] trait; the crate ships
//! an in-memory tier and, behind feature flags, Redis (`redis-store`),
//! SQLite (`sqlite-store`) and an AES-256-GCM encryption middleware
//! (`encryption`).

pub mod error;
pub mod middleware;
pub mod namespace;
pub mod store;
pub mod value;

mod telemetry;
mod tiered;
mod utils;

pub use error::{Error, StoreOp};
#[cfg(feature = "encryption")]
pub use middleware::EncryptionMiddleware;
pub use middleware::StoreMiddleware;
pub use namespace::{BatchEntry, Cacheable, Namespace, NamespaceConfig, SetEntry};
#[cfg(feature = "redis-store")]
pub use store::RedisStore;
#[cfg(feature = "sqlite-store")]
pub use store::SqliteStore;
pub use store::{MemoryStore, MemoryStoreConfig, Store, UnstableEvictOnSet};
pub use value::{CacheValue, SetOptions};

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;
