use std::collections::VecDeque;

use serde_json::Value;

use crate::error::AiError;

pub(crate) const DONE_MARKER: &str = "[DONE]";

/// Line accumulator over a raw byte stream. Provider chunk boundaries do
/// not line up with SSE lines, so bytes are buffered until a full line is
/// available.
pub(crate) struct LineBuffer {
    buffer: VecDeque<u8>,
}

impl LineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Next complete line, trimmed, or None if one hasn't arrived yet.
    pub fn next_line(&mut self) -> Option<Result<String, AiError>> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=newline).collect();

        match std::str::from_utf8(&line) {
            Ok(s) => Some(Ok(s.trim().to_string())),
            Err(e) => Some(Err(AiError::Decode(format!("invalid UTF-8 in event stream: {e}")))),
        }
    }
}

/// Reduce one SSE data payload to plain text.
///
/// Chat-completion events contribute `choices[0].delta.content`; events
/// with no delta (role preamble, finish marker) contribute nothing. Other
/// shapes are probed for a `delta`/`text`/`content` string field, and an
/// unrecognized structured event is passed through as its JSON text rather
/// than dropped.
pub(crate) fn fragment_text(data: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return non_empty(data.to_string()),
    };

    if value.get("choices").is_some() {
        return value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .and_then(non_empty);
    }

    for key in ["delta", "text", "content"] {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            return non_empty(s.to_string());
        }
    }

    non_empty(value.to_string())
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Split text into pieces of at most `chunk_len` characters, on char
/// boundaries.
pub(crate) fn split_chunks(text: &str, chunk_len: usize) -> Vec<String> {
    let chunk_len = chunk_len.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_len)
        .map(|piece| piece.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_split_across_chunks_reassemble() {
        let mut buffer = LineBuffer::with_capacity(64);
        buffer.extend(b"data: {\"te");
        assert!(buffer.next_line().is_none());

        buffer.extend(b"xt\":\"hi\"}\ndata: [DONE]\n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "data: {\"text\":\"hi\"}");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "data: [DONE]");
        assert!(buffer.next_line().is_none());
    }

    #[test]
    fn chat_completion_deltas_normalize_to_text() {
        let event = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(fragment_text(event).as_deref(), Some("Hel"));

        // role preamble and finish events carry no text
        assert_eq!(fragment_text(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(fragment_text(r#"{"choices":[{"finish_reason":"stop"}]}"#), None);
    }

    #[test]
    fn flat_provider_shapes_normalize_to_text() {
        assert_eq!(fragment_text(r#"{"delta":"a"}"#).as_deref(), Some("a"));
        assert_eq!(fragment_text(r#"{"text":"b"}"#).as_deref(), Some("b"));
        assert_eq!(fragment_text(r#"{"content":"c"}"#).as_deref(), Some("c"));
    }

    #[test]
    fn unrecognized_events_pass_through_as_json() {
        let out = fragment_text(r#"{"usage":{"tokens":3}}"#).unwrap();
        assert!(out.contains("usage"));
    }

    #[test]
    fn bare_text_is_its_own_fragment() {
        assert_eq!(fragment_text("plain").as_deref(), Some("plain"));
        assert_eq!(fragment_text(""), None);
    }

    #[test]
    fn chunking_reconstructs_the_source_exactly() {
        let text = "x".repeat(50);
        let pieces = split_chunks(&text, 20);
        assert!(pieces.len() > 1);
        assert_eq!(pieces.concat(), text);
        assert!(pieces.iter().all(|p| p.chars().count() <= 20));
    }

    #[test]
    fn chunking_respects_char_boundaries() {
        let text = "héllo wörld, ça va? ok";
        let pieces = split_chunks(text, 3);
        assert_eq!(pieces.concat(), text);
    }
}
