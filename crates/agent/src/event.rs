use serde::{Deserialize, Serialize};

/// Frame delimiter of the agent wire format. A frame is complete only once
/// both newlines have arrived.
pub const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Line prefix carried by every meaningful frame.
pub const DATA_PREFIX: &str = "data: ";

/// Fixed message substituted when the agent service cannot be reached.
pub const CONNECTIVITY_ERROR_MESSAGE: &str = "Failed to connect to server";

/// One decoded event of an agent turn.
///
/// `Done` and `Error` are terminal; `Status` and `Content` are intermediate.
/// `Content` carries the *full* accumulated reply text so far, not a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Status(String),
    Content(String),
    Done,
    Error(String),
}

impl StreamEvent {
    /// Returns true when this event ends the logical stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

/// Request body for starting one turn against the agent service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRequest {
    pub prompt: String,
    pub chat_id: String,
    pub user_id: String,
}

impl TurnRequest {
    pub fn new(
        prompt: impl Into<String>,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Wire payload of one frame, before mapping into the domain event.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum WireEvent {
    Status {
        #[serde(default)]
        message: String,
    },
    Content {
        #[serde(default)]
        content: String,
    },
    Done,
    Error {
        #[serde(default)]
        message: String,
    },
}

impl From<WireEvent> for StreamEvent {
    fn from(wire: WireEvent) -> Self {
        match wire {
            WireEvent::Status { message } => Self::Status(message),
            WireEvent::Content { content } => Self::Content(content),
            WireEvent::Done => Self::Done,
            WireEvent::Error { message } => Self::Error(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_request_serializes_to_agent_body_shape() {
        let request = TurnRequest::new("hello", "chat-1", "user-1");
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "prompt": "hello",
                "chat_id": "chat-1",
                "user_id": "user-1",
            })
        );
    }

    #[test]
    fn wire_event_maps_every_variant() {
        let cases = [
            (r#"{"type":"status","message":"thinking"}"#, StreamEvent::Status("thinking".into())),
            (r#"{"type":"content","content":"partial"}"#, StreamEvent::Content("partial".into())),
            (r#"{"type":"done"}"#, StreamEvent::Done),
            (r#"{"type":"error","message":"boom"}"#, StreamEvent::Error("boom".into())),
        ];

        for (raw, expected) in cases {
            let wire: WireEvent = serde_json::from_str(raw).unwrap();
            assert_eq!(StreamEvent::from(wire), expected);
        }
    }

    #[test]
    fn missing_payload_fields_default_to_empty() {
        let wire: WireEvent = serde_json::from_str(r#"{"type":"content"}"#).unwrap();
        assert_eq!(StreamEvent::from(wire), StreamEvent::Content(String::new()));
    }
}
