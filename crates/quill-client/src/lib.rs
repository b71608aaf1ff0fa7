//! Cookie-aware HTTP client for a Quill server, including the streaming
//! chat path: the relay body is read in arbitrary-size pieces and decoded
//! incrementally, dispatching each chunk to a callback as it arrives.

use anyhow::{Result, bail};
use futures_util::StreamExt;
use serde_json::json;
use uuid::Uuid;

use quill_relay::{RelayDecoder, RelayEvent};
use quill_types::api::{
    AuthResponse, ChatResponse, CheckAuthResponse, ConversationList, ConversationView,
    UserProfile,
};

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        // the session cookie set at login rides along automatically
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<UserProfile> {
        let response = self
            .http
            .post(format!("{}/auth/register", self.base_url))
            .json(&json!({ "username": username, "email": email, "password": password }))
            .send()
            .await?;
        let response = ok_or_bail(response).await?;
        Ok(response.json::<AuthResponse>().await?.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let response = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = ok_or_bail(response).await?;
        Ok(response.json::<AuthResponse>().await?.user)
    }

    pub async fn check_auth(&self) -> Result<CheckAuthResponse> {
        let response = self.http.get(format!("{}/auth/check", self.base_url)).send().await?;
        Ok(ok_or_bail(response).await?.json().await?)
    }

    pub async fn list_conversations(&self) -> Result<ConversationList> {
        let response = self.http.get(format!("{}/conversations", self.base_url)).send().await?;
        Ok(ok_or_bail(response).await?.json().await?)
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> Result<ConversationView> {
        let response = self
            .http
            .post(format!("{}/conversations", self.base_url))
            .json(&json!({ "title": title }))
            .send()
            .await?;
        Ok(ok_or_bail(response).await?.json().await?)
    }

    /// One-shot chat; the whole reply arrives in a single response.
    pub async fn send(&self, prompt: &str, conversation_id: Option<Uuid>) -> Result<ChatResponse> {
        let response = self
            .http
            .post(format!("{}/chat", self.base_url))
            .json(&json!({ "prompt": prompt, "conversationId": conversation_id, "stream": false }))
            .send()
            .await?;
        Ok(ok_or_bail(response).await?.json().await?)
    }

    /// Streaming chat: decode relay events off the response body and hand
    /// each chunk to `on_chunk` as soon as it is complete.
    pub async fn send_stream(
        &self,
        prompt: &str,
        conversation_id: Option<Uuid>,
        mut on_chunk: impl FnMut(&str),
    ) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/chat", self.base_url))
            .json(&json!({ "prompt": prompt, "conversationId": conversation_id, "stream": true }))
            .send()
            .await?;
        let response = ok_or_bail(response).await?;

        let mut decoder = RelayDecoder::new();
        let mut body = Box::pin(response.bytes_stream());

        while let Some(read) = body.next().await {
            for event in decoder.feed(&read?)? {
                match event {
                    RelayEvent::Chunk { chunk } => on_chunk(&chunk),
                    RelayEvent::Error { error } => bail!("stream failed: {error}"),
                    RelayEvent::Done { .. } => return Ok(()),
                }
            }
        }

        bail!("stream ended without a done event")
    }
}

async fn ok_or_bail(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("server returned {status}: {body}")
}
