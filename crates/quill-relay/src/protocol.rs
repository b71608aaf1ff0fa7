use serde::{Deserialize, Serialize};

/// One event on the relay channel.
///
/// Untagged so the wire shape is exactly `{"chunk": s}`, `{"done": true}`
/// or `{"error": s}` with no enum wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayEvent {
    Chunk { chunk: String },
    Done { done: bool },
    Error { error: String },
}

impl RelayEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        RelayEvent::Chunk { chunk: text.into() }
    }

    pub fn done() -> Self {
        RelayEvent::Done { done: true }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RelayEvent::Error { error: message.into() }
    }
}

/// Frame an event for the wire: `data: <JSON>\n\n`.
pub fn encode_frame(event: &RelayEvent) -> String {
    let json = serde_json::to_string(event).expect("relay events always serialize");
    format!("data: {json}\n\n")
}
