//! Redis-backed cache store
//!
//! Each cache record is a Redis hash at `namespace:set:code`, with each part
//! percent-escaped so a `:` inside a partition cannot shift the layout. The
//! status map is stored as JSON text in the `flt_data_bin` field and the hash
//! carries the record TTL. A single multiplexed connection is opened at startup
//! and shared by every call.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

use super::{CacheKey, CacheStore, StoreError, Ttl};
use crate::record::StatusRecord;

/// Cache store talking to a Redis server
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connects to the Redis server at `host:port`
    ///
    /// # Returns
    /// * `Ok(RedisStore)` once the connection is established
    /// * `Err(StoreError::Redis)` if the URL is invalid or the server is unreachable
    pub async fn connect(host: &str, port: u16) -> Result<Self, StoreError> {
        let url = format!("redis://{}:{}/", host, port);
        let client = redis::Client::open(url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(host, port, "Connected to Redis");
        Ok(Self { conn })
    }

    /// Wraps an existing connection
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

/// Redis key for a cache record
fn redis_key(key: &CacheKey) -> String {
    key.encoded(':')
}

/// Decodes the JSON text held in a hash field
fn decode(key: &CacheKey, field: &str, raw: &str) -> Result<StatusRecord, StoreError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    StatusRecord::from_value(value).ok_or_else(|| StoreError::Shape {
        key: key.to_string(),
        field: field.to_string(),
    })
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn read(&self, key: &CacheKey, field: &str) -> Result<Option<StatusRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(redis_key(key), field).await?;

        raw.map(|raw| decode(key, field, &raw)).transpose()
    }

    async fn write_and_read(
        &self,
        key: &CacheKey,
        field: &str,
        record: &StatusRecord,
        ttl: Ttl,
    ) -> Result<StatusRecord, StoreError> {
        let mut conn = self.conn.clone();
        let rkey = redis_key(key);
        let json = serde_json::to_string(record)?;

        // MULTI/EXEC so concurrent readers never see the field without its TTL
        let (stored,): (Option<String>,) = redis::pipe()
            .atomic()
            .hset(&rkey, field, json)
            .ignore()
            .expire(&rkey, i64::from(ttl.as_secs()))
            .ignore()
            .hget(&rkey, field)
            .query_async(&mut conn)
            .await?;
        debug!(key = %rkey, %ttl, "Stored record");

        let stored = stored.ok_or_else(|| StoreError::KeyNotFound(rkey))?;
        decode(key, field, &stored)
    }

    async fn touch(&self, key: &CacheKey, ttl: Ttl) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let rkey = redis_key(key);

        let updated: bool = conn.expire(&rkey, i64::from(ttl.as_secs())).await?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::KeyNotFound(rkey))
        }
    }
}
