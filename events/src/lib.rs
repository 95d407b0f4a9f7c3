//! Wire records for the chat delivery pipeline.
//!
//! This crate defines the single message-record schema that crosses every
//! best-effort boundary of the ingress path: the broker payload, the recent
//! message cache entries and the frames written to live viewers all carry the
//! same JSON encoding of [`MessageRecord`].
//!
//! # Types
//!
//! - **MessageRecord**: a persisted chat message (chat id, sender id, content, read state)
//! - **BroadcastEvent**: an immutable byte payload submitted to the live fan-out
//!
//! This crate has no dependencies on internal crates (entity, domain, etc.),
//! avoiding circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// A type alias that represents the identifier of chats, users and messages.
/// This matches the definition in the entity crate to maintain compatibility.
pub type Id = i64;

/// Content type tag attached to every encoded [`MessageRecord`].
pub const CONTENT_TYPE: &str = "application/json";

/// A chat message as persisted by the authoritative store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageRecord {
    pub id: Id,
    pub chat_id: Id,
    pub sender_id: Id,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Encodes the record into the bytes shared by the broker, cache and viewers.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// An immutable payload travelling from many producers to the one broadcaster.
///
/// Cloning is cheap: every registered viewer receives the same shared bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastEvent(Arc<[u8]>);

impl BroadcastEvent {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(payload.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&MessageRecord> for BroadcastEvent {
    fn from(record: &MessageRecord) -> Self {
        // A record made of plain fields always encodes; fall back to an empty frame otherwise.
        Self::new(record.to_bytes().unwrap_or_default())
    }
}
