//! Store middlewares.
//!
//! A middleware wraps any [`Store`] and adds behaviour on the way in and out
//! without the tiered cache or the namespace knowing about it.

#[cfg(feature = "encryption")]
mod encryption;
#[cfg(feature = "encryption")]
pub use encryption::EncryptionMiddleware;

use std::sync::Arc;

use crate::store::Store;

/// Wraps a store in added functionality.
pub trait StoreMiddleware {
    fn wrap(&self, store: Arc<dyn Store>) -> Arc<dyn Store>;
}
