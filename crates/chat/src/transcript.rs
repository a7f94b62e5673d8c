use wisp_store::{REQUEST_KIND, RESPONSE_KIND, StoredMessage, TEXT_PART, USER_PROMPT_PART};

use crate::message::Message;

/// Decodes a stored transcript into renderable messages.
///
/// A `request` entry contributes one user message built from the
/// concatenation of its `user-prompt` parts; a `response` entry contributes
/// one bot message from its `text` parts joined with a blank line. Entries
/// that yield no text (tool calls, unknown kinds) are dropped.
pub fn decode_transcript(raw: &str) -> serde_json::Result<Vec<Message>> {
    let stored: Vec<StoredMessage> = serde_json::from_str(raw)?;

    let mut messages = Vec::with_capacity(stored.len());
    for entry in &stored {
        match entry.kind.as_str() {
            REQUEST_KIND => {
                let content = collect_parts(entry, USER_PROMPT_PART, "");
                if !content.is_empty() {
                    messages.push(Message::user(content));
                }
            }
            RESPONSE_KIND => {
                let content = collect_parts(entry, TEXT_PART, "\n\n");
                if !content.is_empty() {
                    messages.push(Message::bot(content));
                }
            }
            _ => {}
        }
    }

    Ok(messages)
}

fn collect_parts(entry: &StoredMessage, part_kind: &str, separator: &str) -> String {
    entry
        .parts
        .iter()
        .filter(|part| part.part_kind == part_kind)
        .map(|part| part.content.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Sender;

    #[test]
    fn request_parts_concatenate_and_response_parts_join_with_blank_line() {
        let raw = r#"[
            {"kind":"request","parts":[
                {"part_kind":"user-prompt","content":"book a "},
                {"part_kind":"user-prompt","content":"flight"}
            ]},
            {"kind":"response","parts":[
                {"part_kind":"text","content":"Sure."},
                {"part_kind":"tool-call","content":"{}"},
                {"part_kind":"text","content":"Which date?"}
            ]}
        ]"#;

        let messages = decode_transcript(raw).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].content, "book a flight");
        assert_eq!(messages[1].sender, Sender::Bot);
        assert_eq!(messages[1].content, "Sure.\n\nWhich date?");
    }

    #[test]
    fn entries_without_matching_parts_are_dropped() {
        let raw = r#"[
            {"kind":"request","parts":[{"part_kind":"system-prompt","content":"be brief"}]},
            {"kind":"response","parts":[{"part_kind":"tool-return","content":"ok"}]},
            {"kind":"summary","parts":[{"part_kind":"text","content":"ignored"}]}
        ]"#;

        assert!(decode_transcript(raw).unwrap().is_empty());
    }

    #[test]
    fn corrupt_transcript_is_an_error_not_a_panic() {
        assert!(decode_transcript("{not json").is_err());
        assert!(decode_transcript("[]").unwrap().is_empty());
    }
}
