use snafu::ResultExt;

use wisp_store::{ChatId, ChatRecord, ChatStore, UserId};

use crate::bus::Invalidation;
use crate::error::{ChatResult, StoreSnafu};

/// Sidebar listing entry for one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: ChatId,
    pub title: String,
    pub updated_at_unix_seconds: u64,
}

impl From<&ChatRecord> for ChatSummary {
    fn from(record: &ChatRecord) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            updated_at_unix_seconds: record.updated_at_unix_seconds,
        }
    }
}

/// Sidebar state: the user's most recent chats plus their display name.
///
/// Mutated optimistically by rename/delete and corrected by canonical
/// refreshes; all its operations are idempotent so duplicate invalidations
/// are harmless.
#[derive(Debug)]
pub struct ChatList {
    user_id: UserId,
    summaries: Vec<ChatSummary>,
    username: Option<String>,
    loaded: bool,
}

impl ChatList {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            summaries: Vec::new(),
            username: None,
            loaded: false,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn summaries(&self) -> &[ChatSummary] {
        &self.summaries
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn has_loaded(&self) -> bool {
        self.loaded
    }

    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.summaries.iter().any(|summary| summary.id == chat_id)
    }

    /// Replaces the listing with the store's current truth (newest first,
    /// already capped by the store).
    pub async fn refresh(&mut self, store: &dyn ChatStore) -> ChatResult<()> {
        let records = store.list_chats(self.user_id).await.context(StoreSnafu {
            stage: "list-refresh",
        })?;

        self.summaries = records.iter().map(ChatSummary::from).collect();
        self.loaded = true;
        Ok(())
    }

    /// Loads the sidebar footer's display name.
    pub async fn load_user_info(&mut self, store: &dyn ChatStore) -> ChatResult<()> {
        let record = store
            .get_services(self.user_id)
            .await
            .context(StoreSnafu {
                stage: "load-user-info",
            })?;

        self.username = record
            .map(|record| record.username)
            .filter(|username| !username.is_empty());
        Ok(())
    }

    /// Applies a title locally. Idempotent; unknown ids are ignored.
    pub fn apply_title(&mut self, chat_id: ChatId, new_title: &str) {
        if let Some(summary) = self
            .summaries
            .iter_mut()
            .find(|summary| summary.id == chat_id)
        {
            summary.title = new_title.to_string();
        }
    }

    /// Removes a chat locally. Idempotent; unknown ids are ignored.
    pub fn remove(&mut self, chat_id: ChatId) {
        self.summaries.retain(|summary| summary.id != chat_id);
    }

    /// Reacts to a bus event published by any component.
    pub async fn handle_invalidation(
        &mut self,
        store: &dyn ChatStore,
        event: &Invalidation,
    ) -> ChatResult<()> {
        match event {
            Invalidation::TitleChanged {
                chat_id,
                new_title: Some(title),
            } => {
                self.apply_title(*chat_id, title);
                Ok(())
            }
            // No carried value means the optimistic value was wrong: refetch.
            Invalidation::TitleChanged {
                new_title: None, ..
            } => self.refresh(store).await,
            Invalidation::ChatDeleted { chat_id } => {
                self.remove(*chat_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wisp_store::{InMemoryChatStore, ServiceRecord};

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
    async fn refresh_lists_newest_first() {
        let store = InMemoryChatStore::new();
        let user_id = UserId::new_v4();
        store.seed_chat(record(user_id, "older", 1_000)).await;
        store.seed_chat(record(user_id, "newer", 2_000)).await;

        let mut list = ChatList::new(user_id);
        list.refresh(&store).await.unwrap();

        assert!(list.has_loaded());
        assert_eq!(list.summaries().len(), 2);
        assert_eq!(list.summaries()[0].title, "newer");
        assert_eq!(list.summaries()[1].title, "older");
    }

    #[tokio::test]
    async fn carried_title_applies_idempotently_and_deletion_removes() {
        let store = InMemoryChatStore::new();
        let user_id = UserId::new_v4();
        let seeded = record(user_id, "before", 1_000);
        let chat_id = seeded.id;
        store.seed_chat(seeded).await;

        let mut list = ChatList::new(user_id);
        list.refresh(&store).await.unwrap();

        let renamed = Invalidation::TitleChanged {
            chat_id,
            new_title: Some("after".to_string()),
        };
        list.handle_invalidation(&store, &renamed).await.unwrap();
        list.handle_invalidation(&store, &renamed).await.unwrap();
        assert_eq!(list.summaries()[0].title, "after");

        let deleted = Invalidation::ChatDeleted { chat_id };
        list.handle_invalidation(&store, &deleted).await.unwrap();
        list.handle_invalidation(&store, &deleted).await.unwrap();
        assert!(list.summaries().is_empty());
    }

    #[tokio::test]
    async fn uncarried_title_invalidation_refetches_canonical_state() {
        let store = InMemoryChatStore::new();
        let user_id = UserId::new_v4();
        let seeded = record(user_id, "canonical", 1_000);
        let chat_id = seeded.id;
        store.seed_chat(seeded).await;

        let mut list = ChatList::new(user_id);
        list.refresh(&store).await.unwrap();
        list.apply_title(chat_id, "optimistic-but-wrong");

        list.handle_invalidation(
            &store,
            &Invalidation::TitleChanged {
                chat_id,
                new_title: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(list.summaries()[0].title, "canonical");
    }

    #[tokio::test]
    async fn username_comes_from_the_service_record() {
        let store = InMemoryChatStore::new();
        let user_id = UserId::new_v4();
        store
            .seed_services(
                user_id,
                ServiceRecord {
                    token_gmail: None,
                    token_calendar: None,
                    username: "sam".to_string(),
                },
            )
            .await;

        let mut list = ChatList::new(user_id);
        list.load_user_info(&store).await.unwrap();
        assert_eq!(list.username(), Some("sam"));
    }
}
