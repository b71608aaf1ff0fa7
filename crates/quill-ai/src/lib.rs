//! Gateway to an OpenAI-compatible completion provider.
//!
//! Offers a one-shot call and a streaming call. The streaming call hides
//! how the provider actually delivers output: a native SSE byte stream is
//! decoded incrementally, and a provider that refuses to stream falls back
//! to a one-shot completion re-segmented into a steady trickle of pieces.

mod client;
mod config;
mod error;
mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

pub use client::OpenAiClient;
pub use config::AiConfig;
pub use error::AiError;

/// Lazy, finite, non-restartable sequence of text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, AiError>> + Send>>;

/// One-shot and streaming completions against a provider.
///
/// Object-safe so handlers can hold a `dyn CompletionClient` and tests can
/// substitute a stub.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Single blocking completion; the full reply text in one piece.
    async fn complete(&self, prompt: &str) -> Result<String, AiError>;

    /// Incremental completion. Fragments are plain text regardless of the
    /// provider's event shape.
    async fn stream(&self, prompt: &str) -> Result<FragmentStream, AiError>;
}
