use crate::error::Error;
use crate::store::CacheStore;
use async_trait::async_trait;
use log::*;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// Redis-backed cache store.
///
/// The connection manager reconnects on its own after Redis restarts; while Redis is
/// down every operation fails with [`CacheErrorKind::Unavailable`](crate::error::CacheErrorKind).
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        info!("Connected to Redis cache store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn push_and_trim(
        &self,
        key: &str,
        value: Vec<u8>,
        max_len: usize,
    ) -> Result<(), Error> {
        let mut connection = self.connection.clone();
        let stop = max_len as isize - 1;
        let _: () = redis::pipe()
            .atomic()
            .lpush(key, value)
            .ignore()
            .ltrim(key, 0, stop)
            .ignore()
            .query_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn head(&self, key: &str, limit: usize) -> Result<Vec<Vec<u8>>, Error> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut connection = self.connection.clone();
        let entries: Vec<Vec<u8>> = connection.lrange(key, 0, limit as isize - 1).await?;
        Ok(entries)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), Error> {
        let mut connection = self.connection.clone();
        let _: () = connection.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = connection.get(key).await?;
        Ok(value)
    }
}
