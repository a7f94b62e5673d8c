use crate::event::{DATA_PREFIX, FRAME_DELIMITER, StreamEvent, WireEvent};

/// Incremental decoder for the agent's chunked wire format.
///
/// Chunk boundaries carry no meaning: frames may be split anywhere, including
/// mid-delimiter and mid-codepoint, so bytes are buffered until a full
/// `\n\n`-terminated frame is available. The first terminal event ends the
/// logical stream; anything buffered behind it is discarded.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    terminated: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk and drains every frame it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }

        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(delimiter_index) = find_delimiter(&self.buffer) {
            let frame: Vec<u8> = self
                .buffer
                .drain(..delimiter_index + FRAME_DELIMITER.len())
                .take(delimiter_index)
                .collect();

            if let Some(event) = decode_frame(&frame) {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    self.terminated = true;
                    self.buffer.clear();
                    break;
                }
            }
        }

        events
    }

    /// Last-chance parse of whatever remains after source exhaustion.
    ///
    /// The agent is expected to close every frame with the delimiter, but a
    /// truncated final frame can still hold a valid event.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.terminated {
            return None;
        }
        self.terminated = true;

        let remainder = std::mem::take(&mut self.buffer);
        decode_frame(&remainder)
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
}

/// Decodes one complete frame, or `None` for frames that carry no event.
///
/// Frames without the `data: ` prefix are ignored silently (the wire allows
/// comment/keepalive lines); frames whose payload fails to parse are logged
/// and skipped without aborting the stream.
fn decode_frame(frame: &[u8]) -> Option<StreamEvent> {
    let text = String::from_utf8_lossy(frame);
    let payload = text.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str::<WireEvent>(payload) {
        Ok(wire) => Some(wire.into()),
        Err(error) => {
            tracing::warn!(error = %error, frame = %text, "skipping malformed stream frame");
            None
        }
    }
}
