use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use super::error::{NotFoundSnafu, StoreResult, UnexpectedStatusSnafu};
use super::ids::{ChatId, UserId};
use super::types::{CHAT_LIST_LIMIT, ChatRecord, NewChat, ServiceRecord};
use super::{BoxFuture, ChatStore};

#[derive(Debug, Default)]
struct MemoryState {
    chats: Vec<ChatRecord>,
    services: HashMap<UserId, ServiceRecord>,
}

/// In-process `ChatStore` used by tests and the QA runner.
///
/// Mutations honor the same ownership rule as the REST client, and the
/// `fail_next_*` switches turn exactly one upcoming remote call into a
/// failure so rollback paths can be exercised deterministically.
#[derive(Debug, Default)]
pub struct InMemoryChatStore {
    state: Mutex<MemoryState>,
    fail_next_update_title: AtomicBool,
    fail_next_delete: AtomicBool,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_chat(&self, record: ChatRecord) {
        let mut state = self.state.lock().await;
        state.chats.retain(|chat| chat.id != record.id);
        state.chats.push(record);
    }

    pub async fn seed_services(&self, user_id: UserId, record: ServiceRecord) {
        self.state.lock().await.services.insert(user_id, record);
    }

    pub fn fail_next_update_title(&self) {
        self.fail_next_update_title.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_delete(&self) {
        self.fail_next_delete.store(true, Ordering::SeqCst);
    }

    /// Current title as stored, regardless of caller identity. Test hook.
    pub async fn stored_title(&self, chat_id: ChatId) -> Option<String> {
        let state = self.state.lock().await;
        state
            .chats
            .iter()
            .find(|chat| chat.id == chat_id)
            .map(|chat| chat.title.clone())
    }

    /// Overwrites the stored transcript for a chat. Test hook standing in for
    /// the agent service's own persistence.
    pub async fn set_transcript(&self, chat_id: ChatId, messages: impl Into<String>) {
        let mut state = self.state.lock().await;
        if let Some(chat) = state.chats.iter_mut().find(|chat| chat.id == chat_id) {
            chat.messages = messages.into();
            chat.updated_at_unix_seconds = current_unix_timestamp_seconds();
        }
    }

    fn take_injected_failure(flag: &AtomicBool, stage: &'static str) -> StoreResult<()> {
        if flag.swap(false, Ordering::SeqCst) {
            return UnexpectedStatusSnafu {
                stage,
                status: 503u16,
                body: "injected failure".to_string(),
            }
            .fail();
        }
        Ok(())
    }
}

impl ChatStore for InMemoryChatStore {
    fn get_chat(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> BoxFuture<'_, StoreResult<Option<ChatRecord>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .chats
                .iter()
                .find(|chat| chat.id == chat_id && chat.user_id == user_id)
                .cloned())
        })
    }

    fn list_chats(&self, user_id: UserId) -> BoxFuture<'_, StoreResult<Vec<ChatRecord>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let mut records: Vec<ChatRecord> = state
                .chats
                .iter()
                .filter(|chat| chat.user_id == user_id)
                .cloned()
                .collect();

            records.sort_by(|left, right| {
                right
                    .updated_at_unix_seconds
                    .cmp(&left.updated_at_unix_seconds)
                    .then_with(|| right.id.cmp(&left.id))
            });
            records.truncate(CHAT_LIST_LIMIT);
            Ok(records)
        })
    }

    fn create_chat(&self, input: NewChat) -> BoxFuture<'_, StoreResult<ChatRecord>> {
        Box::pin(async move {
            let now = current_unix_timestamp_seconds();
            let record = ChatRecord {
                id: ChatId::new_v4(),
                user_id: input.user_id,
                title: input.title,
                messages: input.messages,
                updated_at_unix_seconds: now,
                created_at_unix_seconds: now,
            };

            self.state.lock().await.chats.push(record.clone());
            Ok(record)
        })
    }

    fn update_title(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        new_title: String,
    ) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            Self::take_injected_failure(&self.fail_next_update_title, "update-title-injected")?;

            let mut state = self.state.lock().await;
            let chat = state
                .chats
                .iter_mut()
                .find(|chat| chat.id == chat_id && chat.user_id == user_id)
                .ok_or_else(|| {
                    NotFoundSnafu {
                        stage: "update-title-lookup",
                        entity: "chat",
                        id: chat_id.to_string(),
                    }
                    .build()
                })?;

            chat.title = new_title;
            chat.updated_at_unix_seconds = current_unix_timestamp_seconds();
            Ok(())
        })
    }

    fn delete_chat(&self, user_id: UserId, chat_id: ChatId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            Self::take_injected_failure(&self.fail_next_delete, "delete-chat-injected")?;

            let mut state = self.state.lock().await;
            let before = state.chats.len();
            state
                .chats
                .retain(|chat| !(chat.id == chat_id && chat.user_id == user_id));

            if state.chats.len() == before {
                return NotFoundSnafu {
                    stage: "delete-chat-lookup",
                    entity: "chat",
                    id: chat_id.to_string(),
                }
                .fail();
            }
            Ok(())
        })
    }

    fn get_services(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, StoreResult<Option<ServiceRecord>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.services.get(&user_id).cloned())
        })
    }
}

fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn record(user_id: UserId, title: &str, updated_at: u64) -> ChatRecord {
        ChatRecord {
            id: ChatId::new_v4(),
            user_id,
            title: title.to_string(),
            messages: "[]".to_string(),
            updated_at_unix_seconds: updated_at,
            created_at_unix_seconds: updated_at,
        }
    }

    #[tokio::test]
    async fn listing_is_scoped_capped_and_newest_first() {
        let store = InMemoryChatStore::new();
        let owner = UserId::new_v4();
        let stranger = UserId::new_v4();

        for index in 0..25 {
            store.seed_chat(record(owner, "mine", 1_000 + index)).await;
        }
        store.seed_chat(record(stranger, "theirs", 9_999)).await;

        let listed = store.list_chats(owner).await.unwrap();
        assert_eq!(listed.len(), CHAT_LIST_LIMIT);
        assert!(listed.iter().all(|chat| chat.user_id == owner));
        assert!(
            listed
                .windows(2)
                .all(|pair| pair[0].updated_at_unix_seconds >= pair[1].updated_at_unix_seconds)
        );
    }

    #[tokio::test]
    async fn foreign_chat_reads_as_not_found() {
        let store = InMemoryChatStore::new();
        let owner = UserId::new_v4();
        let chat = record(owner, "private", 1_000);
        let chat_id = chat.id;
        store.seed_chat(chat).await;

        let fetched = store.get_chat(UserId::new_v4(), chat_id).await.unwrap();
        assert!(fetched.is_none());

        let deleted = store.delete_chat(UserId::new_v4(), chat_id).await;
        assert!(matches!(deleted, Err(StoreError::NotFound { .. })));
        assert!(store.stored_title(chat_id).await.is_some());
    }

    #[tokio::test]
    async fn injected_failure_fires_exactly_once() {
        let store = InMemoryChatStore::new();
        let owner = UserId::new_v4();
        let chat = record(owner, "before", 1_000);
        let chat_id = chat.id;
        store.seed_chat(chat).await;

        store.fail_next_update_title();
        let failed = store
            .update_title(owner, chat_id, "after".to_string())
            .await;
        assert!(matches!(failed, Err(StoreError::UnexpectedStatus { .. })));
        assert_eq!(store.stored_title(chat_id).await.as_deref(), Some("before"));

        store
            .update_title(owner, chat_id, "after".to_string())
            .await
            .unwrap();
        assert_eq!(store.stored_title(chat_id).await.as_deref(), Some("after"));
    }
}
