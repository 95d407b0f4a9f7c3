use crate::error::{EntityErrorKind, Error};
use crate::message_store::MessageStore;
use crate::Id;
use broker::BrokerLink;
use cache::RecentMessageCache;
use events::{BroadcastEvent, MessageRecord, CONTENT_TYPE};
use fanout::LiveFanout;
use log::*;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

/// One page of a chat's history, newest first.
#[derive(Debug, PartialEq, Serialize, ToSchema)]
pub struct MessageHistory {
    pub messages: Vec<MessageRecord>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

/// Per-request orchestration of an inbound chat message.
///
/// `send` runs strictly in order: membership check, durable persist, broker
/// publish, cache write-through, live fan-out. Only the first two steps can fail
/// the request; the rest are best-effort and only logged.
pub struct MessageIngress {
    store: Arc<dyn MessageStore>,
    broker: Arc<BrokerLink>,
    cache: Arc<RecentMessageCache>,
    fanout: Arc<LiveFanout>,
}

impl MessageIngress {
    pub fn new(
        store: Arc<dyn MessageStore>,
        broker: Arc<BrokerLink>,
        cache: Arc<RecentMessageCache>,
        fanout: Arc<LiveFanout>,
    ) -> Self {
        Self {
            store,
            broker,
            cache,
            fanout,
        }
    }

    /// Accepts a message from `sender_id` for `chat_id`.
    ///
    /// Returns once the message is persisted; broker, cache and fan-out outcomes
    /// are not part of the result.
    pub async fn send(
        &self,
        sender_id: Id,
        chat_id: Id,
        content: String,
    ) -> Result<MessageRecord, Error> {
        if content.trim().is_empty() {
            return Err(Error::invalid("message content must not be empty"));
        }

        self.ensure_member(chat_id, sender_id).await?;

        let record = self
            .store
            .create_message(chat_id, sender_id, content)
            .await?;
        debug!("Persisted message {} in chat {chat_id}", record.id);

        let payload = match record.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize message {}: {e}", record.id);
                return Ok(record);
            }
        };

        let request = self
            .broker
            .topology()
            .publish_request(payload.clone(), CONTENT_TYPE);
        if let Err(e) = self.broker.publish(&request).await {
            warn!("Message {} was not queued to the broker: {e}", record.id);
        }

        if let Err(e) = self.cache.append(chat_id, &record).await {
            warn!("Message {} was not cached: {e}", record.id);
        }

        self.fanout.submit(BroadcastEvent::new(payload));

        Ok(record)
    }

    /// Reads one page of the chat's history for `reader_id` and marks the other
    /// members' messages read.
    pub async fn history(
        &self,
        reader_id: Id,
        chat_id: Id,
        page: u64,
        limit: u64,
    ) -> Result<MessageHistory, Error> {
        if page < 1 {
            return Err(Error::invalid("page must be at least 1"));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(Error::invalid("limit must be between 1 and 100"));
        }

        self.ensure_member(chat_id, reader_id).await?;

        // Pages come from the store; the cache can miss writes and never sees read marks.
        let messages = self.store.recent_messages(chat_id, page, limit).await?;
        let total = self.store.count_messages(chat_id).await?;
        let history = MessageHistory {
            messages,
            page,
            limit,
            total,
        };

        if let Err(e) = self.store.mark_read(chat_id, reader_id).await {
            warn!("Failed to mark messages read in chat {chat_id} for user {reader_id}: {e}");
        }

        Ok(history)
    }

    /// The chat's newest message, from the cache slot while it lives, otherwise from the store.
    pub async fn latest(&self, reader_id: Id, chat_id: Id) -> Result<Option<MessageRecord>, Error> {
        self.ensure_member(chat_id, reader_id).await?;

        match self.cache.last_message(chat_id).await {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => debug!("No cached last message for chat {chat_id}"),
            Err(e) => warn!("Last-message cache read failed for chat {chat_id}: {e}"),
        }

        self.store.latest_message(chat_id).await
    }

    async fn ensure_member(&self, chat_id: Id, user_id: Id) -> Result<(), Error> {
        if self.store.is_member(chat_id, user_id).await? {
            Ok(())
        } else {
            debug!("User {user_id} is not a member of chat {chat_id}");
            Err(Error::entity(EntityErrorKind::Forbidden))
        }
    }
}
