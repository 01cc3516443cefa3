//! Transparent AEAD encryption for any store.
//!
//! Payloads are sealed with AES-256-GCM before they reach the wrapped store
//! and opened again on the way out; envelope timestamps pass through
//! untouched. The stored key is suffixed with a fingerprint of the key
//! material (`base64(sha256(key))`), which binds ciphertext to the key that
//! produced it: rotating the key changes every lookup key, so old entries
//! become cache misses instead of decrypt failures.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, StoreOp};
use crate::middleware::StoreMiddleware;
use crate::store::Store;
use crate::value::{CacheValue, SetOptions};
use crate::Result;

/// Wire object stored in place of the plaintext payload.
#[derive(Debug, Serialize, Deserialize)]
struct EncryptedValue {
    iv: String,
    ciphertext: String,
}

/// Wraps stores so their payloads are sealed with AES-256-GCM.
pub struct EncryptionMiddleware {
    key: [u8; 32],
    key_fingerprint: String,
}

impl EncryptionMiddleware {
    /// Builds a middleware from a base64-encoded 32-byte key.
    ///
    /// The key material is validated here: bad base64, a wrong length or an
    /// unusable cipher key all fail construction with
    /// [`Error::InvalidKey`].
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let key = BASE64
            .decode(encoded)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = key
            .try_into()
            .map_err(|k: Vec<u8>| Error::InvalidKey(format!("expected 32 bytes, got {}", k.len())))?;

        // Construct the cipher once up front so bad material is rejected at
        // initialization time rather than on the first write.
        UnboundKey::new(&AES_256_GCM, &key)
            .map_err(|_| Error::InvalidKey("unusable AES-256-GCM key".into()))?;

        let key_fingerprint = BASE64.encode(Sha256::digest(key));

        Ok(EncryptionMiddleware {
            key,
            key_fingerprint,
        })
    }

    /// The fingerprint appended to every stored key, `base64(sha256(key))`.
    pub fn key_fingerprint(&self) -> &str {
        &self.key_fingerprint
    }
}

impl StoreMiddleware for EncryptionMiddleware {
    fn wrap(&self, store: Arc<dyn Store>) -> Arc<dyn Store> {
        // The unwrap cannot trip: the same bytes already built a key in
        // `from_base64_key`.
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .unwrap_or_else(|_| unreachable!("key material was validated at construction"));
        Arc::new(EncryptedStore {
            inner: store,
            sealing_key: LessSafeKey::new(unbound),
            key_fingerprint: self.key_fingerprint.clone(),
            rng: SystemRandom::new(),
        })
    }
}

struct EncryptedStore {
    inner: Arc<dyn Store>,
    sealing_key: LessSafeKey,
    key_fingerprint: String,
    rng: SystemRandom,
}

impl EncryptedStore {
    /// Key form on the wrapped store: `"<original_key>/<fingerprint>"`.
    fn sealed_key(&self, key: &str) -> String {
        format!("{key}/{}", self.key_fingerprint)
    }

    fn strip_fingerprint<'a>(&self, key: &'a str) -> &'a str {
        key.strip_suffix(&self.key_fingerprint)
            .and_then(|rest| rest.strip_suffix('/'))
            .unwrap_or(key)
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedValue> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| Error::store(self.inner.name(), StoreOp::Set, "nonce generation failed"))?;

        let mut sealed = plaintext.to_vec();
        self.sealing_key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut sealed)
            .map_err(|_| Error::store(self.inner.name(), StoreOp::Set, "failed to seal payload"))?;

        Ok(EncryptedValue {
            iv: BASE64.encode(nonce),
            ciphertext: BASE64.encode(sealed),
        })
    }

    fn decrypt(&self, encrypted: &EncryptedValue) -> Result<Vec<u8>> {
        let iv = BASE64.decode(&encrypted.iv).map_err(Error::decrypt)?;
        let nonce = Nonce::try_assume_unique_for_key(&iv)
            .map_err(|_| Error::Decrypt("bad nonce length".into()))?;
        let mut sealed = BASE64
            .decode(&encrypted.ciphertext)
            .map_err(Error::decrypt)?;

        let plaintext = self
            .sealing_key
            .open_in_place(nonce, Aad::empty(), &mut sealed)
            .map_err(|_| Error::Decrypt("authentication failed".into()))?;
        Ok(plaintext.to_vec())
    }

    /// Replaces a sealed payload with its decrypted JSON form.
    fn open_envelope(&self, value: &mut CacheValue) -> Result<()> {
        let Some(payload) = value.value.take() else {
            return Ok(());
        };
        let encrypted: EncryptedValue =
            serde_json::from_value(payload).map_err(Error::decrypt)?;
        let plaintext = self.decrypt(&encrypted)?;
        value.value = Some(serde_json::from_slice(&plaintext).map_err(Error::decrypt)?);
        Ok(())
    }

    /// Replaces a plaintext payload with its sealed form.
    ///
    /// An absent payload is sealed too (as JSON `null`), so even tombstones
    /// are indistinguishable from data at rest.
    fn seal_envelope(&self, value: &mut CacheValue) -> Result<()> {
        let plaintext = serde_json::to_vec(&value.value).map_err(Error::decode)?;
        let sealed = self.encrypt(&plaintext)?;
        value.value = Some(serde_json::to_value(sealed).map_err(Error::decode)?);
        Ok(())
    }
}

#[async_trait]
impl Store for EncryptedStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, ns: &str, key: &str) -> Result<Option<CacheValue>> {
        let Some(mut value) = self.inner.get(ns, &self.sealed_key(key)).await? else {
            return Ok(None);
        };
        self.open_envelope(&mut value)?;
        value.key = key.to_string();
        Ok(Some(value))
    }

    async fn get_many(&self, ns: &str, keys: &[String]) -> Result<Vec<CacheValue>> {
        let sealed_keys: Vec<String> = keys.iter().map(|k| self.sealed_key(k)).collect();
        let values = self.inner.get_many(ns, &sealed_keys).await?;

        let mut out = Vec::with_capacity(values.len());
        for mut value in values {
            self.open_envelope(&mut value)?;
            let key = self.strip_fingerprint(&value.key).to_string();
            value.key = key;
            out.push(value);
        }
        Ok(out)
    }

    async fn set(&self, ns: &str, key: &str, mut value: CacheValue) -> Result<()> {
        self.seal_envelope(&mut value)?;
        self.inner.set(ns, &self.sealed_key(key), value).await
    }

    async fn set_many(
        &self,
        ns: &str,
        values: Vec<CacheValue>,
        opts: Option<&SetOptions>,
    ) -> Result<()> {
        let mut sealed = Vec::with_capacity(values.len());
        for mut value in values {
            self.seal_envelope(&mut value)?;
            value.key = self.sealed_key(&value.key);
            sealed.push(value);
        }
        self.inner.set_many(ns, sealed, opts).await
    }

    async fn remove(&self, ns: &str, keys: &[String]) -> Result<()> {
        let sealed_keys: Vec<String> = keys.iter().map(|k| self.sealed_key(k)).collect();
        self.inner.remove(ns, &sealed_keys).await
    }
}
