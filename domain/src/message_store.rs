//! The authoritative store behind message ingress and history reads.

use crate::error::Error;
use crate::Id;
use async_trait::async_trait;
use chrono::Utc;
use entity_api::{chat_user, message, messages};
use events::MessageRecord;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Durable storage for chat membership and messages.
///
/// Every failure here is authoritative: callers surface it and never retry silently.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn is_member(&self, chat_id: Id, user_id: Id) -> Result<bool, Error>;

    /// Persists a new, unread message.
    async fn create_message(
        &self,
        chat_id: Id,
        sender_id: Id,
        content: String,
    ) -> Result<MessageRecord, Error>;

    /// One page of messages, newest first. `page` is 1-based.
    async fn recent_messages(
        &self,
        chat_id: Id,
        page: u64,
        limit: u64,
    ) -> Result<Vec<MessageRecord>, Error>;

    async fn count_messages(&self, chat_id: Id) -> Result<u64, Error>;

    async fn latest_message(&self, chat_id: Id) -> Result<Option<MessageRecord>, Error>;

    /// Marks messages other members sent as read by `reader_id`.
    async fn mark_read(&self, chat_id: Id, reader_id: Id) -> Result<u64, Error>;
}

/// [`MessageStore`] backed by the relational database through `entity_api`.
pub struct DatabaseMessageStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseMessageStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for DatabaseMessageStore {
    async fn is_member(&self, chat_id: Id, user_id: Id) -> Result<bool, Error> {
        Ok(chat_user::is_member(self.db.as_ref(), chat_id, user_id).await?)
    }

    async fn create_message(
        &self,
        chat_id: Id,
        sender_id: Id,
        content: String,
    ) -> Result<MessageRecord, Error> {
        let model = message::create(self.db.as_ref(), chat_id, sender_id, content).await?;
        Ok(to_record(model))
    }

    async fn recent_messages(
        &self,
        chat_id: Id,
        page: u64,
        limit: u64,
    ) -> Result<Vec<MessageRecord>, Error> {
        let models = message::find_recent_by_chat(self.db.as_ref(), chat_id, page, limit).await?;
        Ok(models.into_iter().map(to_record).collect())
    }

    async fn count_messages(&self, chat_id: Id) -> Result<u64, Error> {
        Ok(message::count_by_chat(self.db.as_ref(), chat_id).await?)
    }

    async fn latest_message(&self, chat_id: Id) -> Result<Option<MessageRecord>, Error> {
        let model = message::find_latest_by_chat(self.db.as_ref(), chat_id).await?;
        Ok(model.map(to_record))
    }

    async fn mark_read(&self, chat_id: Id, reader_id: Id) -> Result<u64, Error> {
        Ok(message::mark_read(self.db.as_ref(), chat_id, reader_id).await?)
    }
}

/// The wire record carried through the broker, the cache and the fan-out.
pub fn to_record(model: messages::Model) -> MessageRecord {
    MessageRecord {
        id: model.id,
        chat_id: model.chat_id,
        sender_id: model.sender_id,
        content: model.content,
        is_read: model.is_read,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn to_record_normalizes_timestamps_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let created_at = Utc::now().with_timezone(&offset);
        let model = messages::Model {
            id: 9,
            chat_id: 42,
            sender_id: 7,
            content: "hello".to_string(),
            is_read: true,
            read_at: Some(created_at),
            created_at,
            updated_at: created_at,
        };

        let record = to_record(model);

        assert_eq!(record.id, 9);
        assert_eq!(record.chat_id, 42);
        assert_eq!(record.sender_id, 7);
        assert!(record.is_read);
        assert_eq!(record.created_at, created_at.with_timezone(&Utc));
    }
}
