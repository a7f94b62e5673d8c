use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::decoder::FrameDecoder;
use crate::event::{CONNECTIVITY_ERROR_MESSAGE, StreamEvent, TurnRequest};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, String>> + Send>>;

/// Seam to the remote agent collaborator.
///
/// Opening a turn never fails at the transport level: connectivity problems
/// are folded into the returned stream as a terminal `Error` event, so the
/// consumer has exactly one failure path to render.
pub trait AgentService: Send + Sync {
    fn stream_turn(&self, request: TurnRequest) -> BoxFuture<'_, EventStream>;
}

/// Lazy, non-restartable sequence of `StreamEvent`s for one turn.
///
/// Iteration ends at the first terminal event or at source exhaustion;
/// remaining transport bytes are dropped unread once a terminal event is out.
pub struct EventStream {
    chunks: Option<ChunkStream>,
    decoder: FrameDecoder,
    pending: VecDeque<StreamEvent>,
}

impl EventStream {
    pub(crate) fn from_chunks(chunks: ChunkStream) -> Self {
        Self {
            chunks: Some(chunks),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    /// Builds a stream that yields the given events verbatim.
    ///
    /// Intended for scripted agent fakes in tests and QA scenarios.
    pub fn from_events(events: impl IntoIterator<Item = StreamEvent>) -> Self {
        Self {
            chunks: None,
            decoder: FrameDecoder::new(),
            pending: events.into_iter().collect(),
        }
    }

    /// Builds an already-failed stream carrying the fixed connectivity error.
    pub fn connectivity_error() -> Self {
        Self::from_events([StreamEvent::Error(CONNECTIVITY_ERROR_MESSAGE.to_string())])
    }

    /// Yields the next event, or `None` once the logical stream has ended.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    self.pending.clear();
                    self.chunks = None;
                }
                return Some(event);
            }

            let chunks = self.chunks.as_mut()?;
            match chunks.next().await {
                Some(Ok(chunk)) => {
                    self.pending.extend(self.decoder.feed(&chunk));
                }
                Some(Err(error)) => {
                    tracing::warn!(error = %error, "agent stream transport failed mid-read");
                    self.chunks = None;
                    self.pending
                        .push_back(StreamEvent::Error(CONNECTIVITY_ERROR_MESSAGE.to_string()));
                }
                None => {
                    self.chunks = None;
                    if let Some(event) = self.decoder.finish() {
                        self.pending.push_back(event);
                    }
                }
            }
        }
    }
}

/// HTTP transport for the agent service.
pub struct HttpAgentService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn agent_url(&self) -> String {
        format!("{}/agent", self.base_url)
    }

    async fn open_stream(&self, request: &TurnRequest) -> EventStream {
        let response = match self
            .client
            .post(self.agent_url())
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    chat_id = %request.chat_id,
                    error = %error,
                    "failed to open agent stream"
                );
                return EventStream::connectivity_error();
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                chat_id = %request.chat_id,
                status = status.as_u16(),
                "agent service rejected the turn request"
            );
            return EventStream::connectivity_error();
        }

        let chunks: ChunkStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|error| error.to_string())),
        );
        EventStream::from_chunks(chunks)
    }
}

impl AgentService for HttpAgentService {
    fn stream_turn(&self, request: TurnRequest) -> BoxFuture<'_, EventStream> {
        Box::pin(async move { self.open_stream(&request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_stream(chunks: Vec<Result<Vec<u8>, String>>) -> ChunkStream {
        Box::pin(futures::stream::iter(chunks))
    }

    #[tokio::test]
    async fn yields_decoded_events_across_chunk_boundaries() {
        let wire = concat!(
            "data: {\"type\":\"status\",\"message\":\"working\"}\n\n",
            "data: {\"type\":\"content\",\"content\":\"hi\"}\n\ndata: {\"type\":\"done\"}\n\n",
        );
        let (left, right) = wire.as_bytes().split_at(17);
        let mut stream =
            EventStream::from_chunks(chunk_stream(vec![Ok(left.to_vec()), Ok(right.to_vec())]));

        assert_eq!(stream.recv().await, Some(StreamEvent::Status("working".into())));
        assert_eq!(stream.recv().await, Some(StreamEvent::Content("hi".into())));
        assert_eq!(stream.recv().await, Some(StreamEvent::Done));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn transport_failure_becomes_a_terminal_connectivity_error() {
        let wire = b"data: {\"type\":\"content\",\"content\":\"partial\"}\n\n".to_vec();
        let mut stream = EventStream::from_chunks(chunk_stream(vec![
            Ok(wire),
            Err("connection reset".to_string()),
        ]));

        assert_eq!(stream.recv().await, Some(StreamEvent::Content("partial".into())));
        assert_eq!(
            stream.recv().await,
            Some(StreamEvent::Error(CONNECTIVITY_ERROR_MESSAGE.into()))
        );
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn exhaustion_without_terminal_flushes_the_trailing_frame() {
        let wire = b"data: {\"type\":\"content\",\"content\":\"tail\"}".to_vec();
        let mut stream = EventStream::from_chunks(chunk_stream(vec![Ok(wire)]));

        assert_eq!(stream.recv().await, Some(StreamEvent::Content("tail".into())));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn events_queued_behind_a_terminal_are_discarded() {
        let mut stream = EventStream::from_events([
            StreamEvent::Done,
            StreamEvent::Content("late".into()),
        ]);

        assert_eq!(stream.recv().await, Some(StreamEvent::Done));
        assert_eq!(stream.recv().await, None);
    }
}
