use wisp_store::{
    ChatId, ChatRecord, REQUEST_KIND, RESPONSE_KIND, StoredMessage, TEXT_PART, USER_PROMPT_PART,
};

/// Queries shorter than this return no results.
pub const MIN_QUERY_CHARS: usize = 2;
/// Ranked results are capped at this many chats.
pub const MAX_RESULTS: usize = 20;
/// Characters of context kept on each side of a snippet match.
pub const SNIPPET_CONTEXT_CHARS: usize = 50;

const TITLE_CONTAINS_SCORE: u32 = 100;
const TITLE_PREFIX_BONUS: u32 = 50;
const USER_PART_SCORE: u32 = 10;
const BOT_PART_SCORE: u32 = 5;
const TITLE_WORD_SCORE: u32 = 20;

/// One ranked hit, recomputed per query and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub id: ChatId,
    pub title: String,
    pub snippet: String,
    pub score: u32,
    pub updated_at_unix_seconds: u64,
}

/// Scores and sorts stored chats against a query.
///
/// Pure and deterministic for identical inputs. Matching is case-insensitive
/// substring matching throughout; only chats scoring above zero survive.
pub fn rank(chats: &[ChatRecord], query: &str) -> Vec<SearchResult> {
    let needle = query.trim().to_lowercase();
    if needle.chars().count() < MIN_QUERY_CHARS {
        return Vec::new();
    }

    let mut results: Vec<SearchResult> = chats
        .iter()
        .filter_map(|chat| score_chat(chat, &needle))
        .collect();

    results.sort_by(|left, right| {
        right
            .score
            .cmp(&left.score)
            .then_with(|| right.updated_at_unix_seconds.cmp(&left.updated_at_unix_seconds))
    });
    results.truncate(MAX_RESULTS);
    results
}

fn score_chat(chat: &ChatRecord, needle: &str) -> Option<SearchResult> {
    let title_lower = chat.title.to_lowercase();
    let mut score = 0u32;

    if title_lower.contains(needle) {
        score += TITLE_CONTAINS_SCORE;
        if title_lower.starts_with(needle) {
            score += TITLE_PREFIX_BONUS;
        }
    }

    // A transcript that fails to parse contributes no content matches; the
    // title can still qualify the chat.
    let stored: Vec<StoredMessage> = serde_json::from_str(&chat.messages).unwrap_or_default();
    let mut first_match: Option<&str> = None;

    for entry in &stored {
        let (part_kind, part_score) = match entry.kind.as_str() {
            REQUEST_KIND => (USER_PROMPT_PART, USER_PART_SCORE),
            RESPONSE_KIND => (TEXT_PART, BOT_PART_SCORE),
            _ => continue,
        };

        for part in entry.parts.iter().filter(|part| part.part_kind == part_kind) {
            if part.content.to_lowercase().contains(needle) {
                score += part_score;
                if first_match.is_none() {
                    first_match = Some(part.content.as_str());
                }
            }
        }
    }

    let query_words: Vec<&str> = needle.split_whitespace().collect();
    if query_words.len() > 1 {
        let title_words: Vec<&str> = title_lower.split_whitespace().collect();
        let matching_words = query_words
            .iter()
            .filter(|word| title_words.iter().any(|title_word| title_word.contains(*word)))
            .count() as u32;
        score += matching_words * TITLE_WORD_SCORE;
    }

    if score == 0 {
        return None;
    }

    let snippet = first_match
        .map(|content| extract_snippet(content, needle))
        .unwrap_or_else(|| format!("Chat: {}", chat.title));

    let updated_at = if chat.updated_at_unix_seconds != 0 {
        chat.updated_at_unix_seconds
    } else {
        chat.created_at_unix_seconds
    };

    Some(SearchResult {
        id: chat.id,
        title: chat.title.clone(),
        snippet,
        score,
        updated_at_unix_seconds: updated_at,
    })
}

/// Cuts a window of [`SNIPPET_CONTEXT_CHARS`] characters around the first
/// match, marking truncation with ellipses.
fn extract_snippet(content: &str, needle: &str) -> String {
    let lower = content.to_lowercase();
    let Some(byte_index) = lower.find(needle) else {
        return content.to_string();
    };

    let match_start = lower[..byte_index].chars().count();
    let match_len = needle.chars().count();
    let chars: Vec<char> = content.chars().collect();

    let start = match_start.saturating_sub(SNIPPET_CONTEXT_CHARS);
    let end = (match_start + match_len + SNIPPET_CONTEXT_CHARS).min(chars.len());

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str("...");
    }
    snippet.extend(&chars[start..end]);
    if end < chars.len() {
        snippet.push_str("...");
    }
    snippet
}
