use crate::error::Error;
use crate::store::CacheStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Expired values are swept once every this many value writes.
const PRUNE_EVERY: usize = 256;

/// In-process cache store.
///
/// Used when no Redis is configured or reachable, and by tests. Expiry follows the
/// tokio clock so paused-time tests can advance past a TTL. Lists are bounded by
/// trimming and, as in Redis, never expire.
#[derive(Default)]
pub struct MemoryStore {
    lists: DashMap<String, VecDeque<Vec<u8>>>,
    values: DashMap<String, (Vec<u8>, Instant)>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired value. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.values.len();
        self.values.retain(|_, (_, expires_at)| *expires_at > now);
        before.saturating_sub(self.values.len())
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn push_and_trim(
        &self,
        key: &str,
        value: Vec<u8>,
        max_len: usize,
    ) -> Result<(), Error> {
        let mut list = self.lists.entry(key.to_owned()).or_default();
        list.push_front(value);
        list.truncate(max_len);
        Ok(())
    }

    async fn head(&self, key: &str, limit: usize) -> Result<Vec<Vec<u8>>, Error> {
        Ok(self
            .lists
            .get(key)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), Error> {
        self.values
            .insert(key.to_owned(), (value, Instant::now() + ttl));

        if self.writes.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune_expired();
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        match self.values.get(key) {
            None => return Ok(None),
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => {}
        }
        self.values
            .remove_if(key, |_, (_, expires_at)| *expires_at <= Instant::now());
        Ok(None)
    }
}
