const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-5";

/// Provider configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Piece size when re-segmenting a one-shot reply for streaming.
    pub chunk_len: usize,
    /// Pause between re-segmented pieces, so clients see a steady trickle.
    pub chunk_delay_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 32_000,
            chunk_len: 20,
            chunk_delay_ms: 25,
        }
    }
}

impl AiConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        if let Some(url) = std::env::var("OPENAI_BASE_URL").ok().filter(|v| !v.is_empty()) {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("QUILL_AI_MODEL") {
            config.model = model;
        }
        config
    }
}
