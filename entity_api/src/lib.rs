pub use entity::{archived_messages, chat_users, chats, messages, Id};

pub mod chat_user;
pub mod error;
pub mod message;

/// Converts a 1-based page and a page size into a row offset.
pub(crate) fn page_offset(page: u64, limit: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(limit)
}
