//! Embedded SQLite tier.
//!
//! Entries live in a `(key, fresh_until, stale_until, value)` table with
//! timestamps stored as RFC3339 strings and the payload as JSON text. Writes
//! use `INSERT OR REPLACE`; batch writes are chunked at 2000 rows per
//! statement and are not transactional across chunks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;

use super::{store_key, user_key, Store};
use crate::error::{Error, StoreOp};
use crate::value::{CacheValue, SetOptions};
use crate::Result;

const STORE_NAME: &str = "sqlite";
const DEFAULT_TABLE: &str = "cache";

// Keeps a batch statement well under SQLite's bound-parameter limit.
const CHUNK_SIZE: usize = 2000;

/// Row as read from the table, before envelope reconstruction.
type RawRow = (String, String, String, String);

pub struct SqliteStore {
    conn: Connection,
    table: String,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self::with_table(conn, DEFAULT_TABLE)
    }

    pub fn with_table(conn: Connection, table: impl Into<String>) -> Self {
        SqliteStore {
            conn,
            table: table.into(),
        }
    }

    /// Creates the backing table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, fresh_until TEXT, stale_until TEXT, value TEXT)",
            self.table
        );
        self.conn
            .call(move |conn| {
                conn.execute_batch(&ddl)?;
                Ok(())
            })
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::Connect, e))
    }

    fn decode_row(&self, ns: &str, row: RawRow) -> Result<CacheValue> {
        let (key, fresh_until, stale_until, raw) = row;
        let fresh_until = parse_rfc3339(&fresh_until)?;
        let stale_until = parse_rfc3339(&stale_until)?;
        let payload: Option<serde_json::Value> =
            serde_json::from_str(&raw).map_err(Error::decode)?;

        let mut value = CacheValue::new(
            user_key(ns, &key).to_string(),
            payload,
            fresh_until,
            stale_until,
        );
        value.found = true;
        Ok(value)
    }
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(Error::decode)
}

fn payload_text(value: &CacheValue) -> Result<String> {
    serde_json::to_string(&value.value).map_err(Error::decode)
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    async fn get(&self, ns: &str, key: &str) -> Result<Option<CacheValue>> {
        let sql = format!(
            "SELECT key, fresh_until, stale_until, value FROM {} WHERE key = ?1",
            self.table
        );
        let cache_key = store_key(ns, key);

        let row: Option<RawRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let mut rows = stmt.query([cache_key])?;
                match rows.next()? {
                    Some(row) => Ok(Some((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))),
                    None => Ok(None),
                }
            })
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::Get, e))?;

        match row {
            Some(row) => Ok(Some(self.decode_row(ns, row)?)),
            None => Ok(None),
        }
    }

    async fn get_many(&self, ns: &str, keys: &[String]) -> Result<Vec<CacheValue>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; keys.len()].join(",");
        let sql = format!(
            "SELECT key, fresh_until, stale_until, value FROM {} WHERE key IN ({placeholders})",
            self.table
        );
        let cache_keys: Vec<String> = keys.iter().map(|k| store_key(ns, k)).collect();

        let rows: Vec<RawRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(cache_keys), |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(Into::into)
            })
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::GetMany, e))?;

        rows.into_iter()
            .map(|row| self.decode_row(ns, row))
            .collect()
    }

    async fn set(&self, ns: &str, key: &str, value: CacheValue) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (key, fresh_until, stale_until, value) VALUES (?1, ?2, ?3, ?4)",
            self.table
        );
        let row = [
            store_key(ns, key),
            value.fresh_until.to_rfc3339(),
            value.stale_until.to_rfc3339(),
            payload_text(&value)?,
        ];

        self.conn
            .call(move |conn| {
                conn.execute(&sql, row)?;
                Ok(())
            })
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::Set, e))
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

        let mut rows = Vec::with_capacity(values.len());
        for value in &values {
            rows.push([
                store_key(ns, &value.key),
                value.fresh_until.to_rfc3339(),
                value.stale_until.to_rfc3339(),
                payload_text(value)?,
            ]);
        }

        for chunk in rows.chunks(CHUNK_SIZE) {
            let tuples = vec!["(?, ?, ?, ?)"; chunk.len()].join(",");
            let sql = format!(
                "INSERT OR REPLACE INTO {} (key, fresh_until, stale_until, value) VALUES {tuples}",
                self.table
            );
            let params: Vec<String> = chunk.iter().flatten().cloned().collect();

            self.conn
                .call(move |conn| {
                    conn.execute(&sql, rusqlite::params_from_iter(params))?;
                    Ok(())
                })
                .await
                .map_err(|e| Error::store(STORE_NAME, StoreOp::SetMany, e))?;
        }

        Ok(())
    }

    async fn remove(&self, ns: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; keys.len()].join(",");
        let sql = format!("DELETE FROM {} WHERE key IN ({placeholders})", self.table);
        let cache_keys: Vec<String> = keys.iter().map(|k| store_key(ns, k)).collect();

        self.conn
            .call(move |conn| {
                conn.execute(&sql, rusqlite::params_from_iter(cache_keys))?;
                Ok(())
            })
            .await
            .map_err(|e| Error::store(STORE_NAME, StoreOp::Remove, e))
    }
}
