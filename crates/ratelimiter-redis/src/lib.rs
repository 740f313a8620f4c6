//! A [`StoreClient`] backed by Redis's `EVALSHA`/`EVAL` pair, matching
//! the server-side scripting contract spec.md §4.1 requires. Pooling,
//! auth, and connection-string parsing are left to callers — this
//! crate only wraps one already-open connection.

use async_trait::async_trait;
use ratelimiter_core::{StoreClient, StoreClientError};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ErrorKind};
use tracing::debug;

fn map_err(err: redis::RedisError) -> StoreClientError {
    if err.kind() == ErrorKind::NoScriptError {
        StoreClientError::UnknownScript
    } else {
        StoreClientError::Other(anyhow::Error::new(err))
    }
}

/// A `StoreClient` over a single Redis connection. Cheap to clone: the
/// underlying [`MultiplexedConnection`] multiplexes every call over one
/// socket, so cloning this is the intended way to share it across
/// concurrently-running [`ratelimiter_core::RateLimiter`] calls.
#[derive(Clone)]
pub struct RedisStoreClient {
    conn: MultiplexedConnection,
}

impl RedisStoreClient {
    /// Open a connection to `redis_url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { conn })
    }

    /// Wrap an already-open connection, e.g. one shared with other
    /// subsystems of a caller's process.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl StoreClient for RedisStoreClient {
    async fn eval_by_hash(
        &self,
        sha: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, StoreClientError> {
        let mut conn = self.conn.clone();
        redis::cmd("EVALSHA")
            .arg(sha)
            .arg(keys.len())
            .arg(keys)
            .arg(args)
            .query_async(&mut conn)
            .await
            .map_err(map_err)
    }

    async fn eval_by_body(
        &self,
        body: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, StoreClientError> {
        debug!("evaluating script by body, store will cache it under a new digest");
        let mut conn = self.conn.clone();
        redis::cmd("EVAL")
            .arg(body)
            .arg(keys.len())
            .arg(keys)
            .arg(args)
            .query_async(&mut conn)
            .await
            .map_err(map_err)
    }

    async fn hget(&self, hash_key: &str, field: &str) -> Result<Option<i64>, StoreClientError> {
        let mut conn = self.conn.clone();
        conn.hget(hash_key, field).await.map_err(map_err)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreClientError> {
        let mut conn = self.conn.clone();
        conn.keys(pattern).await.map_err(map_err)
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreClientError> {
        let mut conn = self.conn.clone();
        conn.sadd(set, member).await.map_err(map_err)
    }

    async fn srem(&self, set: &str, member: &str) -> Result<(), StoreClientError> {
        let mut conn = self.conn.clone();
        conn.srem(set, member).await.map_err(map_err)
    }
}
