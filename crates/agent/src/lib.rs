pub mod client;
pub mod decoder;
pub mod event;

pub use client::{AgentService, BoxFuture, EventStream, HttpAgentService};
pub use decoder::FrameDecoder;
pub use event::{
    CONNECTIVITY_ERROR_MESSAGE, DATA_PREFIX, FRAME_DELIMITER, StreamEvent, TurnRequest,
};
