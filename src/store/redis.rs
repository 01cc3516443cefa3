//! Redis-compatible remote tier.
//!
//! Each entry is a single key holding the serialized envelope. Expiry is
//! delegated to the server: every write sets an absolute deadline at the
//! entry's stale instant (`PXAT`), so Redis drops entries the moment they
//! stop being serveable. Batch reads and writes are pipelined.
//!
//! Works against anything speaking the Redis protocol (Redis, Valkey,
//! Dragonfly, …).

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{store_key, Store};
use crate::error::{Error, StoreOp};
use crate::value::{CacheValue, SetOptions};
use crate::Result;

const STORE_NAME: &str = "redis";

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the given URL (`redis://host:port/db`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::store(STORE_NAME, StoreOp::Connect, e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::Connect, e))?;
        Ok(RedisStore { conn })
    }

    /// Wraps an already established connection manager.
    pub fn with_connection(conn: ConnectionManager) -> Self {
        RedisStore { conn }
    }
}

#[async_trait]
impl Store for RedisStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    async fn get(&self, ns: &str, key: &str) -> Result<Option<CacheValue>> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = redis::cmd("GET")
            .arg(store_key(ns, key))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::Get, e))?;

        let Some(bytes) = raw else {
            return Ok(None);
        };
        Ok(Some(CacheValue::from_bytes(key, &bytes)?))
    }

    async fn get_many(&self, ns: &str, keys: &[String]) -> Result<Vec<CacheValue>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(store_key(ns, key));
        }
        let raws: Vec<Option<Vec<u8>>> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::GetMany, e))?;

        let mut values = Vec::new();
        for (key, raw) in keys.iter().zip(raws) {
            let Some(bytes) = raw else {
                continue;
            };
            values.push(CacheValue::from_bytes(key, &bytes)?);
        }
        Ok(values)
    }

    async fn set(&self, ns: &str, key: &str, value: CacheValue) -> Result<()> {
        let mut conn = self.conn.clone();
        let bytes = value.to_bytes()?;
        let _: () = redis::cmd("SET")
            .arg(store_key(ns, key))
            .arg(bytes)
            .arg("PXAT")
            .arg(value.stale_until.timestamp_millis())
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::Set, e))?;
        Ok(())
    }

    async fn set_many(
        &self,
        ns: &str,
        values: Vec<CacheValue>,
        _opts: Option<&SetOptions>,
    ) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        // Each entry carries its own deadline, so this is a pipeline of
        // SET ... PXAT rather than one MSET.
        let mut pipe = redis::pipe();
        for value in &values {
            pipe.cmd("SET")
                .arg(store_key(ns, &value.key))
                .arg(value.to_bytes()?)
                .arg("PXAT")
                .arg(value.stale_until.timestamp_millis())
                .ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::SetMany, e))?;
        Ok(())
    }

    async fn remove(&self, ns: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(store_key(ns, key));
        }
        let _: () = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::Remove, e))?;
        Ok(())
    }
}
