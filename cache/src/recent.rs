use crate::error::Error;
use crate::store::CacheStore;
use events::{Id, MessageRecord};
use log::*;
use std::sync::Arc;
use std::time::Duration;

/// Bounds for the per-chat recency buffer and the last-message slot.
#[derive(Clone, Debug, PartialEq)]
pub struct CachePolicy {
    /// Maximum number of messages retained per chat.
    pub max_messages: usize,
    /// How long the last-message slot lives after its most recent write.
    pub last_message_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_messages: 100,
            last_message_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Short-horizon cache of the most recent messages of every chat.
///
/// Purely an accelerator: a miss or an error here must always be answerable from
/// durable storage. Keys never interact, so no cross-key locking happens.
pub struct RecentMessageCache {
    store: Arc<dyn CacheStore>,
    policy: CachePolicy,
}

impl RecentMessageCache {
    pub fn new(store: Arc<dyn CacheStore>, mut policy: CachePolicy) -> Self {
        policy.max_messages = policy.max_messages.max(1);
        Self { store, policy }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Pushes `message` to the front of the chat's buffer, trims the buffer to the
    /// configured bound and overwrites the last-message slot with a fresh expiry.
    ///
    /// Both writes are always attempted; the first failure is returned.
    pub async fn append(&self, chat_id: Id, message: &MessageRecord) -> Result<(), Error> {
        let payload = message.to_bytes()?;

        let pushed = self
            .store
            .push_and_trim(
                &messages_key(chat_id),
                payload.clone(),
                self.policy.max_messages,
            )
            .await;

        let slotted = self
            .store
            .set_with_expiry(
                &last_message_key(chat_id),
                payload,
                self.policy.last_message_ttl,
            )
            .await;

        pushed.and(slotted)
    }

    /// Up to `limit` newest-first messages; empty when nothing is cached.
    pub async fn recent(&self, chat_id: Id, limit: usize) -> Result<Vec<MessageRecord>, Error> {
        let limit = limit.min(self.policy.max_messages);
        let entries = self.store.head(&messages_key(chat_id), limit).await?;

        Ok(entries
            .iter()
            .filter_map(|entry| match MessageRecord::from_bytes(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping undecodable cache entry for chat {chat_id}: {e}");
                    None
                }
            })
            .collect())
    }

    /// The chat's last message, absent once the slot's TTL has elapsed.
    pub async fn last_message(&self, chat_id: Id) -> Result<Option<MessageRecord>, Error> {
        match self.store.get(&last_message_key(chat_id)).await? {
            Some(bytes) => match MessageRecord::from_bytes(&bytes) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!("Ignoring undecodable last message for chat {chat_id}: {e}");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

fn messages_key(chat_id: Id) -> String {
    format!("chat:{chat_id}:messages")
}

fn last_message_key(chat_id: Id) -> String {
    format!("chat:{chat_id}:last_message")
}
