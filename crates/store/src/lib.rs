use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod ids;
pub mod memory;
pub mod rest;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use ids::{ChatId, UserId};
pub use memory::InMemoryChatStore;
pub use rest::RestChatStore;
pub use types::{
    CHAT_LIST_LIMIT, ChatRecord, DEFAULT_CHAT_TITLE, NewChat, REQUEST_KIND, RESPONSE_KIND,
    ServiceAvailability, ServiceRecord, StoredMessage, StoredPart, TEXT_PART, USER_PROMPT_PART,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Narrow CRUD surface of the remote document store.
///
/// Every operation is scoped to one authenticated user; a record whose owner
/// does not match is indistinguishable from a missing record.
pub trait ChatStore: Send + Sync {
    fn get_chat(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> BoxFuture<'_, StoreResult<Option<ChatRecord>>>;

    /// Most recently updated chats for the user, newest first, capped at
    /// [`CHAT_LIST_LIMIT`].
    fn list_chats(&self, user_id: UserId) -> BoxFuture<'_, StoreResult<Vec<ChatRecord>>>;

    fn create_chat(&self, input: NewChat) -> BoxFuture<'_, StoreResult<ChatRecord>>;

    fn update_title(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        new_title: String,
    ) -> BoxFuture<'_, StoreResult<()>>;

    fn delete_chat(&self, user_id: UserId, chat_id: ChatId) -> BoxFuture<'_, StoreResult<()>>;

    fn get_services(&self, user_id: UserId)
    -> BoxFuture<'_, StoreResult<Option<ServiceRecord>>>;
}
