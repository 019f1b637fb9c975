//! Redis store backend, shared by every service instance.

use super::KvStore;
use crate::error::{PoolError, PoolResult};
use futures::future::BoxFuture;
use redis::aio::ConnectionManager;
use tracing::info;

/// [`KvStore`] over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> PoolResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(operation = "redis_connect", "Connected to redis");
        Ok(Self { conn })
    }
}

impl KvStore for RedisStore {
    fn hincr_by<'a>(
        &'a self,
        key: &'a str,
        field: &'a str,
        delta: i64,
    ) -> BoxFuture<'a, PoolResult<i64>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: i64 = redis::cmd("HINCRBY")
                .arg(key)
                .arg(field)
                .arg(delta)
                .query_async(&mut conn)
                .await?;
            Ok(value)
        })
    }

    fn hget<'a>(&'a self, key: &'a str, field: &'a str) -> BoxFuture<'a, PoolResult<Option<i64>>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<i64> = redis::cmd("HGET")
                .arg(key)
                .arg(field)
                .query_async(&mut conn)
                .await?;
            Ok(value)
        })
    }

    fn hset<'a>(&'a self, key: &'a str, field: &'a str, value: i64) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: i64 = redis::cmd("HSET")
                .arg(key)
                .arg(field)
                .arg(value)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
    }

    fn hdel<'a>(&'a self, key: &'a str, field: &'a str) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: i64 = redis::cmd("HDEL")
                .arg(key)
                .arg(field)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
    }

    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, PoolResult<bool>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let added: i64 = redis::cmd("SADD")
                .arg(key)
                .arg(member)
                .query_async(&mut conn)
                .await?;
            Ok(added > 0)
        })
    }

    fn spop<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PoolResult<Option<String>>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let member: Option<String> = redis::cmd("SPOP").arg(key).query_async(&mut conn).await?;
            Ok(member)
        })
    }

    fn scard<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PoolResult<u64>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let count: u64 = redis::cmd("SCARD").arg(key).query_async(&mut conn).await?;
            Ok(count)
        })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let result: redis::RedisResult<()> = redis::cmd("RENAME")
                .arg(from)
                .arg(to)
                .query_async(&mut conn)
                .await;
            match result {
                Ok(()) => Ok(()),
                Err(e) if e.to_string().contains("no such key") => {
                    Err(PoolError::NotFound(format!("no such key: {}", from)))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PoolResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
            Ok(())
        })
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
