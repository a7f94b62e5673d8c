use snafu::Snafu;

use wisp_store::{ChatId, StoreError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("a turn is already streaming for chat '{chat_id}'"))]
    TurnInFlight {
        stage: &'static str,
        chat_id: ChatId,
    },
    #[snafu(display("cannot start a turn with an empty prompt"))]
    EmptyPrompt { stage: &'static str },
    #[snafu(display("cannot rename chat '{chat_id}' to an empty title"))]
    EmptyTitle {
        stage: &'static str,
        chat_id: ChatId,
    },
    #[snafu(display("store call failed on `{stage}`, {source}"))]
    Store {
        stage: &'static str,
        source: StoreError,
    },
    #[snafu(display("failed to decode stored transcript for chat '{chat_id}'"))]
    DecodeTranscript {
        stage: &'static str,
        chat_id: ChatId,
        source: serde_json::Error,
    },
}

pub type ChatResult<T> = Result<T, ChatError>;
