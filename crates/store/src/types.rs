use serde::{Deserialize, Serialize};

use super::ids::{ChatId, UserId};

/// Title applied when a chat is created or renamed with blank input.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Listing queries never return more than this many chats.
pub const CHAT_LIST_LIMIT: usize = 20;

/// Transcript entry kind for a user turn.
pub const REQUEST_KIND: &str = "request";
/// Transcript entry kind for an agent turn.
pub const RESPONSE_KIND: &str = "response";
/// Part kind carrying the user's prompt text.
pub const USER_PROMPT_PART: &str = "user-prompt";
/// Part kind carrying agent reply text.
pub const TEXT_PART: &str = "text";

/// One durable chat document.
///
/// `messages` holds the JSON-encoded transcript exactly as the agent service
/// persisted it; decoding is deferred to the consumer so a corrupt transcript
/// cannot poison a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: ChatId,
    pub user_id: UserId,
    pub title: String,
    pub messages: String,
    #[serde(rename = "updated_at")]
    pub updated_at_unix_seconds: u64,
    #[serde(rename = "created_at")]
    pub created_at_unix_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewChat {
    pub user_id: UserId,
    pub title: String,
    pub messages: String,
}

impl NewChat {
    /// Builds a creation request with an empty transcript, normalizing blank
    /// titles to the default.
    pub fn empty(user_id: UserId, title: impl Into<String>) -> Self {
        let mut title = title.into();
        if title.trim().is_empty() {
            title = DEFAULT_CHAT_TITLE.to_string();
        }

        Self {
            user_id,
            title,
            messages: "[]".to_string(),
        }
    }
}

/// Account-linking document for one user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(default)]
    pub token_gmail: Option<String>,
    #[serde(default)]
    pub token_calendar: Option<String>,
    #[serde(default)]
    pub username: String,
}

impl ServiceRecord {
    pub fn availability(&self) -> ServiceAvailability {
        ServiceAvailability {
            gmail: self.token_gmail.is_some(),
            calendar: self.token_calendar.is_some(),
        }
    }
}

/// Read-only projection of which external services are linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceAvailability {
    pub gmail: bool,
    pub calendar: bool,
}

/// One entry of a stored transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub kind: String,
    #[serde(default)]
    pub parts: Vec<StoredPart>,
}

/// One content part of a stored transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPart {
    pub part_kind: String,
    #[serde(default)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_record_uses_wire_field_names() {
        let record = ChatRecord {
            id: ChatId::new_v4(),
            user_id: UserId::new_v4(),
            title: "Weekly sync".to_string(),
            messages: "[]".to_string(),
            updated_at_unix_seconds: 1_700_000_200,
            created_at_unix_seconds: 1_700_000_100,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["updated_at"], 1_700_000_200);
        assert_eq!(value["created_at"], 1_700_000_100);
    }

    #[test]
    fn blank_new_chat_title_falls_back_to_default() {
        let input = NewChat::empty(UserId::new_v4(), "   ");
        assert_eq!(input.title, DEFAULT_CHAT_TITLE);
        assert_eq!(input.messages, "[]");
    }

    #[test]
    fn availability_reflects_linked_tokens() {
        let record = ServiceRecord {
            token_gmail: Some("opaque".to_string()),
            token_calendar: None,
            username: "sam".to_string(),
        };

        let availability = record.availability();
        assert!(availability.gmail);
        assert!(!availability.calendar);
    }
}
