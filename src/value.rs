//! The storage envelope shared by every tier.
//!
//! A [`CacheValue`] is what stores persist and exchange: the JSON payload
//! plus the two-phase clock (`FreshUntil` / `StaleUntil`). The typed payload
//! of a namespace is bridged through [`serde_json::Value`] here, so a value
//! written by one tier is readable by any other regardless of how that tier
//! persists bytes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

/// The unit of storage.
///
/// On the wire this serializes to `{"Value": …, "FreshUntil": …,
/// "StaleUntil": …}` with RFC3339 timestamps. `key` and `found` are transient
/// bookkeeping and are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheValue {
    /// Original, un-namespaced key. Stores fill this in on read.
    #[serde(skip)]
    pub key: String,

    /// The JSON payload. `None` marks a tombstone-style entry.
    #[serde(rename = "Value")]
    pub value: Option<serde_json::Value>,

    /// Instant before which the payload counts as fresh.
    #[serde(rename = "FreshUntil")]
    pub fresh_until: DateTime<Utc>,

    /// Instant before which the payload may still be served. Past it the
    /// entry must be treated as absent and evicted on observation.
    #[serde(rename = "StaleUntil")]
    pub stale_until: DateTime<Utc>,

    /// Set by stores on read to mark presence.
    #[serde(skip)]
    pub found: bool,
}

impl CacheValue {
    pub fn new(
        key: impl Into<String>,
        value: Option<serde_json::Value>,
        fresh_until: DateTime<Utc>,
        stale_until: DateTime<Utc>,
    ) -> Self {
        CacheValue {
            key: key.into(),
            value,
            fresh_until,
            stale_until,
            found: false,
        }
    }

    /// A synthetic envelope marking a batch-read miss.
    pub fn miss(key: impl Into<String>) -> Self {
        CacheValue {
            key: key.into(),
            value: None,
            fresh_until: DateTime::UNIX_EPOCH,
            stale_until: DateTime::UNIX_EPOCH,
            found: false,
        }
    }

    /// Serializes the envelope to its JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::decode)
    }

    /// Parses an envelope from its JSON wire form.
    ///
    /// The returned envelope carries the given `key` and `found = true`; this
    /// is the read-path constructor for byte-oriented stores.
    pub fn from_bytes(key: &str, bytes: &[u8]) -> Result<Self> {
        let mut value: CacheValue = serde_json::from_slice(bytes).map_err(Error::decode)?;
        value.key = key.to_string();
        value.found = true;
        Ok(value)
    }

    /// Decodes the payload into the caller's type.
    ///
    /// An absent payload decodes to `None`; a present payload that does not
    /// match `T` is a [`Error::Decode`].
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.value {
            None => Ok(None),
            Some(raw) => serde_json::from_value(raw.clone())
                .map(Some)
                .map_err(Error::decode),
        }
    }

    /// Whether the entry is past its serveable window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.stale_until
    }
}

/// Per-write override of the namespace's fresh/stale durations.
///
/// Unset (or zero) fields fall back to the namespace defaults; zero is a
/// sentinel, not "expire immediately".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub fresh: Option<Duration>,
    pub stale: Option<Duration>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(mut self, fresh: Duration) -> Self {
        self.fresh = Some(fresh);
        self
    }

    pub fn stale(mut self, stale: Duration) -> Self {
        self.stale = Some(stale);
        self
    }

    /// Resolves the effective duration for one of the fields.
    pub(crate) fn resolve(field: Option<Duration>, default: Duration) -> Duration {
        field.filter(|d| !d.is_zero()).unwrap_or(default)
    }
}

/// Offsets a timestamp, saturating instead of overflowing on absurd inputs.
pub(crate) fn time_after(now: DateTime<Utc>, offset: Duration) -> DateTime<Utc> {
    chrono::TimeDelta::from_std(offset)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_form_uses_pascal_case_and_rfc3339() {
        let fresh = "2026-01-02T03:04:05Z".parse::<DateTime<Utc>>().unwrap();
        let stale = "2026-01-02T04:04:05Z".parse::<DateTime<Utc>>().unwrap();
        let value = CacheValue::new("user1", Some(json!({"Name": "Flo"})), fresh, stale);

        let raw: serde_json::Value = serde_json::from_slice(&value.to_bytes().unwrap()).unwrap();
        assert_eq!(raw["Value"]["Name"], "Flo");
        assert_eq!(raw["FreshUntil"], "2026-01-02T03:04:05Z");
        assert_eq!(raw["StaleUntil"], "2026-01-02T04:04:05Z");
        assert!(raw.get("key").is_none());
        assert!(raw.get("found").is_none());
    }

    #[test]
    fn from_bytes_restores_key_and_marks_found() {
        let bytes = br#"{"Value":"v","FreshUntil":"2026-01-02T03:04:05Z","StaleUntil":"2026-01-02T04:04:05Z"}"#;
        let value = CacheValue::from_bytes("k1", bytes).unwrap();
        assert_eq!(value.key, "k1");
        assert!(value.found);
        assert_eq!(value.decode_payload::<String>().unwrap().unwrap(), "v");
    }

    #[test]
    fn null_payload_round_trips_as_tombstone() {
        let bytes = br#"{"Value":null,"FreshUntil":"2026-01-02T03:04:05Z","StaleUntil":"2026-01-02T04:04:05Z"}"#;
        let value = CacheValue::from_bytes("k1", bytes).unwrap();
        assert!(value.value.is_none());
        assert_eq!(value.decode_payload::<String>().unwrap(), None);
    }

    #[test]
    fn decode_payload_rejects_type_mismatch() {
        let now = Utc::now();
        let value = CacheValue::new("k", Some(json!({"a": 1})), now, now);
        assert!(matches!(
            value.decode_payload::<u32>(),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn malformed_bytes_are_a_decode_error() {
        assert!(matches!(
            CacheValue::from_bytes("k", b"not json"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn zero_duration_falls_back_to_default() {
        let default = Duration::from_secs(600);
        assert_eq!(SetOptions::resolve(None, default), default);
        assert_eq!(SetOptions::resolve(Some(Duration::ZERO), default), default);
        assert_eq!(
            SetOptions::resolve(Some(Duration::from_secs(5)), default),
            Duration::from_secs(5)
        );
    }
}
