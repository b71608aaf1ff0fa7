use thiserror::Error;

/// Provider-side failure. Everything here maps to an upstream error at the
/// API boundary; none of these are retried.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("provider API key is not configured")]
    MissingApiKey,

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("could not interpret provider response: {0}")]
    Malformed(String),

    #[error("stream decode failed: {0}")]
    Decode(String),
}
