pub mod prelude;

pub mod archived_messages;
pub mod chat_users;
pub mod chats;
pub mod messages;

/// A type alias that represents any Entity's internal id field data type.
/// Aliased so that it's easy to change the underlying type if necessary.
pub type Id = i64;
