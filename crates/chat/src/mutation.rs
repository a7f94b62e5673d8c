use std::sync::Arc;

use snafu::ensure;

use wisp_store::{ChatId, ChatStore};

use crate::bus::{Invalidation, InvalidationBus};
use crate::error::{ChatResult, EmptyTitleSnafu};
use crate::sidebar::ChatList;

/// What a mutation is trying to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Rename { chat_id: ChatId, new_title: String },
    Delete { chat_id: ChatId },
}

/// Lifecycle of the most recent optimistic mutation.
///
/// Every mutation resolves: `Pending` is only observable mid-call, and the
/// final state is always `Committed` or `RolledBack`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MutationState {
    #[default]
    Idle,
    Pending(MutationKind),
    Committed(MutationKind),
    RolledBack(MutationKind),
}

/// Applies rename/delete optimistically, persists remotely, and reconciles
/// on failure.
///
/// The local effect and its invalidation go out *before* the remote call; a
/// success republishes the same invalidation (subscribers are idempotent),
/// and a failure refetches the canonical listing and publishes a carried-
/// value-free invalidation so every view converges to ground truth.
pub struct MutationManager {
    bus: Arc<InvalidationBus>,
    state: MutationState,
}

impl MutationManager {
    pub fn new(bus: Arc<InvalidationBus>) -> Self {
        Self {
            bus,
            state: MutationState::default(),
        }
    }

    pub fn state(&self) -> &MutationState {
        &self.state
    }

    pub async fn rename(
        &mut self,
        store: &dyn ChatStore,
        list: &mut ChatList,
        chat_id: ChatId,
        new_title: impl Into<String>,
    ) -> ChatResult<()> {
        let new_title = new_title.into().trim().to_string();
        ensure!(
            !new_title.is_empty(),
            EmptyTitleSnafu {
                stage: "rename",
                chat_id,
            }
        );

        let kind = MutationKind::Rename {
            chat_id,
            new_title: new_title.clone(),
        };
        self.state = MutationState::Pending(kind.clone());

        list.apply_title(chat_id, &new_title);
        self.bus.publish(Invalidation::TitleChanged {
            chat_id,
            new_title: Some(new_title.clone()),
        });

        match store
            .update_title(list.user_id(), chat_id, new_title.clone())
            .await
        {
            Ok(()) => {
                self.bus.publish(Invalidation::TitleChanged {
                    chat_id,
                    new_title: Some(new_title),
                });
                self.state = MutationState::Committed(kind);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    chat_id = %chat_id,
                    error = %error,
                    "rename failed remotely; reconciling from canonical store"
                );
                self.reconcile(store, list, chat_id).await?;
                self.state = MutationState::RolledBack(kind);
                Ok(())
            }
        }
    }

    pub async fn delete(
        &mut self,
        store: &dyn ChatStore,
        list: &mut ChatList,
        chat_id: ChatId,
    ) -> ChatResult<()> {
        let kind = MutationKind::Delete { chat_id };
        self.state = MutationState::Pending(kind.clone());

        list.remove(chat_id);
        self.bus.publish(Invalidation::ChatDeleted { chat_id });

        match store.delete_chat(list.user_id(), chat_id).await {
            Ok(()) => {
                self.bus.publish(Invalidation::ChatDeleted { chat_id });
                self.state = MutationState::Committed(kind);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    chat_id = %chat_id,
                    error = %error,
                    "delete failed remotely; reconciling from canonical store"
                );
                self.reconcile(store, list, chat_id).await?;
                self.state = MutationState::RolledBack(kind);
                Ok(())
            }
        }
    }

    /// Rollback path shared by both mutations: refetch the listing, then tell
    /// every subscriber to do the same.
    async fn reconcile(
        &self,
        store: &dyn ChatStore,
        list: &mut ChatList,
        chat_id: ChatId,
    ) -> ChatResult<()> {
        list.refresh(store).await?;
        self.bus.publish(Invalidation::TitleChanged {
            chat_id,
            new_title: None,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wisp_store::{ChatRecord, InMemoryChatStore, UserId};

    use crate::bus::InvalidationSubscription;

    fn record(user_id: UserId, title: &str) -> ChatRecord {
        ChatRecord {
            id: ChatId::new_v4(),
            user_id,
            title: title.to_string(),
            messages: "[]".to_string(),
            updated_at_unix_seconds: 1_700_000_000,
            created_at_unix_seconds: 1_700_000_000,
        }
    }

    async fn seeded(
        title: &str,
    ) -> (InMemoryChatStore, ChatList, ChatId, Arc<InvalidationBus>) {
        let store = InMemoryChatStore::new();
        let user_id = UserId::new_v4();
        let seeded = record(user_id, title);
        let chat_id = seeded.id;
        store.seed_chat(seeded).await;

        let mut list = ChatList::new(user_id);
        list.refresh(&store).await.unwrap();
        (store, list, chat_id, Arc::new(InvalidationBus::new()))
    }

    fn drain(subscription: &mut InvalidationSubscription) -> Vec<Invalidation> {
        std::iter::from_fn(|| subscription.try_recv()).collect()
    }

    #[tokio::test]
    async fn successful_rename_commits_and_publishes_twice() {
        let (store, mut list, chat_id, bus) = seeded("before").await;
        let mut subscription = bus.subscribe();
        let mut manager = MutationManager::new(bus);

        manager
            .rename(&store, &mut list, chat_id, "after")
            .await
            .unwrap();

        assert!(matches!(manager.state(), MutationState::Committed(_)));
        assert_eq!(list.summaries()[0].title, "after");
        assert_eq!(store.stored_title(chat_id).await.as_deref(), Some("after"));

        let expected = Invalidation::TitleChanged {
            chat_id,
            new_title: Some("after".to_string()),
        };
        assert_eq!(drain(&mut subscription), vec![expected.clone(), expected]);
    }

    #[tokio::test]
    async fn failed_rename_rolls_back_to_the_canonical_title() {
        let (store, mut list, chat_id, bus) = seeded("canonical").await;
        let mut subscription = bus.subscribe();
        let mut manager = MutationManager::new(bus);

        store.fail_next_update_title();
        manager
            .rename(&store, &mut list, chat_id, "optimistic")
            .await
            .unwrap();

        assert!(matches!(manager.state(), MutationState::RolledBack(_)));
        assert_eq!(list.summaries()[0].title, "canonical");
        assert_eq!(
            store.stored_title(chat_id).await.as_deref(),
            Some("canonical")
        );

        let events = drain(&mut subscription);
        assert_eq!(
            events,
            vec![
                Invalidation::TitleChanged {
                    chat_id,
                    new_title: Some("optimistic".to_string()),
                },
                Invalidation::TitleChanged {
                    chat_id,
                    new_title: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn successful_delete_commits_and_removes_locally() {
        let (store, mut list, chat_id, bus) = seeded("doomed").await;
        let mut subscription = bus.subscribe();
        let mut manager = MutationManager::new(bus);

        manager.delete(&store, &mut list, chat_id).await.unwrap();

        assert!(matches!(manager.state(), MutationState::Committed(_)));
        assert!(list.summaries().is_empty());
        assert!(store.stored_title(chat_id).await.is_none());

        let expected = Invalidation::ChatDeleted { chat_id };
        assert_eq!(drain(&mut subscription), vec![expected.clone(), expected]);
    }

    #[tokio::test]
    async fn failed_delete_restores_the_listing() {
        let (store, mut list, chat_id, bus) = seeded("survivor").await;
        let mut manager = MutationManager::new(bus);

        store.fail_next_delete();
        manager.delete(&store, &mut list, chat_id).await.unwrap();

        assert!(matches!(manager.state(), MutationState::RolledBack(_)));
        assert_eq!(list.summaries().len(), 1);
        assert_eq!(list.summaries()[0].title, "survivor");
        assert_eq!(
            store.stored_title(chat_id).await.as_deref(),
            Some("survivor")
        );
    }

    #[tokio::test]
    async fn blank_rename_is_rejected_before_any_effect() {
        let (store, mut list, chat_id, bus) = seeded("untouched").await;
        let mut subscription = bus.subscribe();
        let mut manager = MutationManager::new(bus);

        let result = manager.rename(&store, &mut list, chat_id, "   ").await;
        assert!(matches!(
            result,
            Err(crate::error::ChatError::EmptyTitle { .. })
        ));
        assert!(matches!(manager.state(), MutationState::Idle));
        assert_eq!(list.summaries()[0].title, "untouched");
        assert!(drain(&mut subscription).is_empty());
    }
}
