use reqwest::StatusCode;
use serde::Serialize;
use snafu::ResultExt;

use super::error::{DecodeRecordSnafu, HttpSnafu, NotFoundSnafu, StoreResult, UnexpectedStatusSnafu};
use super::ids::{ChatId, UserId};
use super::types::{CHAT_LIST_LIMIT, ChatRecord, NewChat, ServiceRecord};
use super::{BoxFuture, ChatStore};

#[derive(Debug, Serialize)]
struct TitlePatch<'a> {
    title: &'a str,
}

/// HTTP client for the document store's chat and service collections.
///
/// Ownership is enforced twice: the store scopes queries by `user_id`, and
/// fetched records are re-checked client-side so a mismatched owner degrades
/// to not-found rather than leaking another user's chat.
pub struct RestChatStore {
    client: reqwest::Client,
    base_url: String,
}

impl RestChatStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn chat_url(&self, chat_id: ChatId) -> String {
        format!("{}/chats/{chat_id}", self.base_url)
    }

    fn chats_url(&self) -> String {
        format!("{}/chats", self.base_url)
    }

    fn services_url(&self, user_id: UserId) -> String {
        format!("{}/services/{user_id}", self.base_url)
    }

    async fn check_status(
        response: reqwest::Response,
        stage: &'static str,
    ) -> StoreResult<Option<reqwest::Response>> {
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return UnexpectedStatusSnafu {
                stage,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        Ok(Some(response))
    }

    async fn fetch_chat(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> StoreResult<Option<ChatRecord>> {
        let response = self
            .client
            .get(self.chat_url(chat_id))
            .send()
            .await
            .context(HttpSnafu {
                stage: "get-chat-send",
            })?;

        let Some(response) = Self::check_status(response, "get-chat-status").await? else {
            return Ok(None);
        };

        let record: ChatRecord = response.json().await.context(DecodeRecordSnafu {
            stage: "get-chat-decode",
        })?;

        if record.user_id != user_id {
            tracing::warn!(
                chat_id = %chat_id,
                "chat owner mismatch; treating record as not found"
            );
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn fetch_chats(&self, user_id: UserId) -> StoreResult<Vec<ChatRecord>> {
        let response = self
            .client
            .get(self.chats_url())
            .query(&[
                ("user_id", user_id.to_string()),
                ("limit", CHAT_LIST_LIMIT.to_string()),
            ])
            .send()
            .await
            .context(HttpSnafu {
                stage: "list-chats-send",
            })?;

        let Some(response) = Self::check_status(response, "list-chats-status").await? else {
            return Ok(Vec::new());
        };

        let mut records: Vec<ChatRecord> = response.json().await.context(DecodeRecordSnafu {
            stage: "list-chats-decode",
        })?;

        records.retain(|record| record.user_id == user_id);
        records.truncate(CHAT_LIST_LIMIT);
        Ok(records)
    }

    async fn post_chat(&self, input: NewChat) -> StoreResult<ChatRecord> {
        let response = self
            .client
            .post(self.chats_url())
            .json(&input)
            .send()
            .await
            .context(HttpSnafu {
                stage: "create-chat-send",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return UnexpectedStatusSnafu {
                stage: "create-chat-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        response.json().await.context(DecodeRecordSnafu {
            stage: "create-chat-decode",
        })
    }

    async fn patch_title(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        new_title: &str,
    ) -> StoreResult<()> {
        // Confirm ownership first; a foreign chat must fail exactly like a
        // missing one.
        if self.fetch_chat(user_id, chat_id).await?.is_none() {
            return NotFoundSnafu {
                stage: "update-title-ownership",
                entity: "chat",
                id: chat_id.to_string(),
            }
            .fail();
        }

        let response = self
            .client
            .patch(self.chat_url(chat_id))
            .json(&TitlePatch { title: new_title })
            .send()
            .await
            .context(HttpSnafu {
                stage: "update-title-send",
            })?;

        Self::check_status(response, "update-title-status").await?;
        Ok(())
    }

    async fn remove_chat(&self, user_id: UserId, chat_id: ChatId) -> StoreResult<()> {
        if self.fetch_chat(user_id, chat_id).await?.is_none() {
            return NotFoundSnafu {
                stage: "delete-chat-ownership",
                entity: "chat",
                id: chat_id.to_string(),
            }
            .fail();
        }

        let response = self
            .client
            .delete(self.chat_url(chat_id))
            .send()
            .await
            .context(HttpSnafu {
                stage: "delete-chat-send",
            })?;

        Self::check_status(response, "delete-chat-status").await?;
        Ok(())
    }

    async fn fetch_services(&self, user_id: UserId) -> StoreResult<Option<ServiceRecord>> {
        let response = self
            .client
            .get(self.services_url(user_id))
            .send()
            .await
            .context(HttpSnafu {
                stage: "get-services-send",
            })?;

        let Some(response) = Self::check_status(response, "get-services-status").await? else {
            return Ok(None);
        };

        let record = response.json().await.context(DecodeRecordSnafu {
            stage: "get-services-decode",
        })?;
        Ok(Some(record))
    }
}

impl ChatStore for RestChatStore {
    fn get_chat(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> BoxFuture<'_, StoreResult<Option<ChatRecord>>> {
        Box::pin(self.fetch_chat(user_id, chat_id))
    }

    fn list_chats(&self, user_id: UserId) -> BoxFuture<'_, StoreResult<Vec<ChatRecord>>> {
        Box::pin(self.fetch_chats(user_id))
    }

    fn create_chat(&self, input: NewChat) -> BoxFuture<'_, StoreResult<ChatRecord>> {
        Box::pin(self.post_chat(input))
    }

    fn update_title(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        new_title: String,
    ) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move { self.patch_title(user_id, chat_id, &new_title).await })
    }

    fn delete_chat(&self, user_id: UserId, chat_id: ChatId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(self.remove_chat(user_id, chat_id))
    }

    fn get_services(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, StoreResult<Option<ServiceRecord>>> {
        Box::pin(self.fetch_services(user_id))
    }
}
