use thiserror::Error;

use crate::protocol::RelayEvent;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("relay stream is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed relay payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Incremental decoder for the relay wire format.
///
/// Bytes are accumulated across reads; complete blank-line-terminated
/// events are drained and returned in order, and a partial tail is kept
/// for the next read. An event boundary falling in the middle of a read
/// (or even mid-codepoint) therefore never loses or duplicates events.
/// After a `done` event the decoder is finished and ignores further input.
#[derive(Debug, Default)]
pub struct RelayDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl RelayDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a `done` event has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one network read; returns every event completed by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<RelayEvent>, DecodeError> {
        if self.finished {
            return Ok(Vec::new());
        }
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(boundary) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..boundary + 2).collect();
            let block = std::str::from_utf8(&block)?;

            for line in block.lines() {
                let Some(payload) = line.strip_prefix("data:") else {
                    // comments, event names etc. are not part of this protocol
                    continue;
                };
                let event: RelayEvent = serde_json::from_str(payload.trim_start())?;
                let done = matches!(event, RelayEvent::Done { .. });
                events.push(event);
                if done {
                    self.finished = true;
                    self.buffer.clear();
                    return Ok(events);
                }
            }
        }

        Ok(events)
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}
