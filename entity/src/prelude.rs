pub use super::archived_messages::Entity as ArchivedMessages;
pub use super::chat_users::Entity as ChatUsers;
pub use super::chats::Entity as Chats;
pub use super::messages::Entity as Messages;
