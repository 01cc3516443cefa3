//! Unified error type for all cache operations.
//!
//! Every fallible operation in this crate returns [`enum@Error`]. The type is
//! deliberately `Clone`: results of a deduplicated origin refresh are fanned
//! out to every waiter, so backend causes are flattened into messages instead
//! of carrying non-clonable source errors around.

use std::fmt;

use thiserror::Error;

/// The store operation that failed, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Connect,
    Get,
    GetMany,
    Set,
    SetMany,
    Remove,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Connect => "connect",
            StoreOp::Get => "get",
            StoreOp::GetMany => "get-many",
            StoreOp::Set => "set",
            StoreOp::SetMany => "set-many",
            StoreOp::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Unified error type for the cache.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A namespace was configured without any backing stores.
    #[error("no stores configured")]
    NoStores,

    /// An empty key was passed to a single-key operation.
    #[error("key is empty")]
    EmptyKey,

    /// An empty key list was passed to a batch read.
    #[error("no keys provided")]
    NoKeys,

    /// An empty value list was passed to a batch write.
    #[error("no values provided")]
    NoValues,

    /// A backing store failed. Carries the store name and the operation so
    /// callers can tell which tier misbehaved.
    #[error("{store} store failed to {op}: {message}")]
    Store {
        store: String,
        op: StoreOp,
        message: String,
    },

    /// Malformed envelope bytes, or the payload does not match the requested
    /// type.
    #[error("failed to decode cached value: {0}")]
    Decode(String),

    /// The authentication tag did not verify, or the decrypted plaintext was
    /// not valid JSON.
    #[error("failed to decrypt cached value: {0}")]
    Decrypt(String),

    /// Encryption key material was rejected at construction time.
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    /// A caller-supplied origin refresh failed. Every waiter coalesced onto
    /// the same refresh observes the same error.
    #[error("origin refresh failed: {0}")]
    Origin(String),

    /// The operation producing a shared result went away before publishing it.
    #[error("operation was cancelled")]
    Cancelled,
}

impl Error {
    /// Wraps a backend failure with the store name and operation.
    pub fn store(store: impl Into<String>, op: StoreOp, cause: impl fmt::Display) -> Self {
        Error::Store {
            store: store.into(),
            op,
            message: cause.to_string(),
        }
    }

    /// Wraps a failure of a caller-supplied origin refresh.
    pub fn origin(cause: impl fmt::Display) -> Self {
        Error::Origin(cause.to_string())
    }

    pub(crate) fn decode(cause: impl fmt::Display) -> Self {
        Error::Decode(cause.to_string())
    }

    #[cfg(feature = "encryption")]
    pub(crate) fn decrypt(cause: impl fmt::Display) -> Self {
        Error::Decrypt(cause.to_string())
    }
}
