//! Chat message orchestration.
//!
//! The `domain` crate ties the authoritative store to the best-effort delivery paths:
//! the broker link, the recent-message cache and the live fan-out. It also re-exports
//! the entity types the `web` layer needs, so `web` never depends on `entity_api`
//! directly.

// Re-exports from `entity` crate via `entity_api`
pub use entity_api::{archived_messages, chat_users, chats, messages, Id};
pub use events::MessageRecord;

pub mod archive;
pub mod error;
pub mod ingress;
pub mod message_store;

pub use ingress::{MessageHistory, MessageIngress};
pub use message_store::{DatabaseMessageStore, MessageStore};
