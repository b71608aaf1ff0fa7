use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::error::AiError;
use crate::sse::{DONE_MARKER, LineBuffer, fragment_text, split_chunks};
use crate::{CompletionClient, FragmentStream};

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    config: AiConfig,
}

/// How this call will deliver fragments, decided once up front.
enum StreamSource {
    /// Provider accepted `stream: true`; decode its SSE byte body.
    Sse(reqwest::Response),
    /// Provider only gave us a full reply; re-segment it ourselves.
    FullText(String),
}

impl OpenAiClient {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, AiError> {
        self.config.api_key.as_deref().ok_or(AiError::MissingApiKey)
    }

    fn payload(&self, prompt: &str, stream: bool) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        });

        // o1 / gpt-5 family renamed the token cap
        let token_field = if self.config.model.starts_with("o1") || self.config.model.starts_with("gpt-5")
        {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        payload[token_field] = json!(self.config.max_tokens);

        payload
    }

    async fn request(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, AiError> {
        let key = self.api_key()?;

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(key)
            .json(&self.payload(prompt, stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Resolve the delivery mode for one streaming call. A provider that
    /// rejects the streaming request falls back to a one-shot completion;
    /// if that fails too, the whole call fails.
    async fn acquire_source(&self, prompt: &str) -> Result<StreamSource, AiError> {
        match self.request(prompt, true).await {
            Ok(response) => Ok(StreamSource::Sse(response)),
            Err(AiError::MissingApiKey) => Err(AiError::MissingApiKey),
            Err(e) => {
                warn!("streaming request failed, falling back to one-shot completion: {e}");
                let text = self.complete(prompt).await?;
                Ok(StreamSource::FullText(text))
            }
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        let response = self.request(prompt, false).await?;
        let body: Value = response.json().await?;

        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AiError::Malformed(format!("no message content in reply: {body}")))
    }

    async fn stream(&self, prompt: &str) -> Result<FragmentStream, AiError> {
        let source = self.acquire_source(prompt).await?;
        let chunk_len = self.config.chunk_len;
        let delay = Duration::from_millis(self.config.chunk_delay_ms);

        Ok(match source {
            StreamSource::Sse(response) => sse_stream(response, chunk_len, delay),
            StreamSource::FullText(text) => segment_stream(text, chunk_len, delay),
        })
    }
}

/// Trickle a full reply out in fixed-size pieces with a short pause
/// between them, so downstream consumers see streaming either way.
fn segment_stream(text: String, chunk_len: usize, delay: Duration) -> FragmentStream {
    Box::pin(async_stream::stream! {
        for piece in split_chunks(&text, chunk_len) {
            yield Ok(piece);
            tokio::time::sleep(delay).await;
        }
    })
}

/// Decode a provider SSE body into normalized text fragments.
fn sse_stream(response: reqwest::Response, chunk_len: usize, delay: Duration) -> FragmentStream {
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(response.bytes_stream());
        let mut buffer = LineBuffer::with_capacity(4096);

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(AiError::Http(e));
                    return;
                }
            };
            buffer.extend(&chunk);

            while let Some(line) = buffer.next_line() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == DONE_MARKER {
                    break 'read;
                }

                let Some(fragment) = fragment_text(data) else {
                    continue;
                };
                debug!("provider fragment ({} chars)", fragment.chars().count());

                // very long fragments are re-segmented for a smoother trickle
                if fragment.chars().count() > 200 {
                    for piece in split_chunks(&fragment, chunk_len) {
                        yield Ok(piece);
                        tokio::time::sleep(delay).await;
                    }
                } else {
                    yield Ok(fragment);
                }
            }
        }
    })
}
