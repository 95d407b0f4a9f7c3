use crate::error::Error;
use async_trait::async_trait;
use std::time::Duration;

/// The two logical operations the recent-message cache needs from a key/value store.
///
/// Reads return empty or absent values on a miss rather than an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Pushes `value` to the head of the list at `key`, then trims the list to `max_len`.
    async fn push_and_trim(&self, key: &str, value: Vec<u8>, max_len: usize)
        -> Result<(), Error>;

    /// Returns up to `limit` entries from the head of the list at `key`.
    async fn head(&self, key: &str, limit: usize) -> Result<Vec<Vec<u8>>, Error>;

    /// Overwrites the singleton value at `key`, expiring it after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl: Duration)
        -> Result<(), Error>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;
}
