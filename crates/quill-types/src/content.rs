use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

/// Who authored a message in a conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// Wrap plain text in the canonical `{"text": ...}` content shape.
pub fn text_content(text: &str) -> Value {
    json!({ "text": text })
}

/// Interpret a raw provider reply as stored content.
///
/// Replies that parse as a JSON object (the provider's nested
/// `steps`/`output`/`content` shape) are kept verbatim; anything else,
/// including bare JSON scalars, is wrapped as `{"text": ...}`.
pub fn parse_or_wrap(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Object(_)) => v,
        _ => text_content(raw),
    }
}

/// Pull a human-readable line out of a stored content value, for previews.
pub fn preview_text(content: &Value) -> Option<&str> {
    if let Some(text) = content.get("text").and_then(Value::as_str) {
        return Some(text);
    }
    // Nested provider shape: first text leaf under output/content arrays.
    content
        .get("output")
        .or_else(|| content.get("content"))
        .and_then(Value::as_array)
        .and_then(|items| items.iter().find_map(|item| item.get("text").and_then(Value::as_str)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_replies_kept_verbatim() {
        let v = parse_or_wrap(r#"{"output":[{"text":"hi"}]}"#);
        assert!(v.get("output").is_some());
    }

    #[test]
    fn scalars_and_prose_are_wrapped() {
        assert_eq!(parse_or_wrap("4"), json!({ "text": "4" }));
        assert_eq!(parse_or_wrap("plain prose"), json!({ "text": "plain prose" }));
        assert_eq!(parse_or_wrap("[1,2]"), json!({ "text": "[1,2]" }));
    }

    #[test]
    fn preview_descends_into_nested_shapes() {
        assert_eq!(preview_text(&json!({ "text": "top" })), Some("top"));
        let nested = json!({ "output": [{ "text": "leaf" }] });
        assert_eq!(preview_text(&nested), Some("leaf"));
        assert_eq!(preview_text(&json!({ "other": 1 })), None);
    }
}
