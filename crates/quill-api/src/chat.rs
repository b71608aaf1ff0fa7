use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};
use tracing::error;
use uuid::Uuid;

use quill_db::models::{ConversationRow, MessageRow};
use quill_relay::{RelayEvent, encode_frame};
use quill_types::MessageRole;
use quill_types::api::{ChatHistory, ChatRequest, ChatResponse};
use quill_types::content::{parse_or_wrap, text_content};

use crate::conversations::detail;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

const MAX_PROMPT_CHARS: usize = 5000;
const TITLE_MAX_CHARS: usize = 50;

/// The chat pipeline: resolve the conversation, persist the prompt, call
/// the provider, relay the reply, persist it.
///
/// The prompt is durable before any provider call is made, so a dead
/// provider can never lose user input. In streaming mode the response is
/// an open relay channel; failures after that point are in-band events.
pub async fn handle_chat(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let prompt_chars = req.prompt.chars().count();
    if prompt_chars == 0 || prompt_chars > MAX_PROMPT_CHARS {
        return Err(ApiError::Validation(format!(
            "Prompt must be between 1 and {MAX_PROMPT_CHARS} characters"
        )));
    }

    let conversation_id = resolve_and_persist_prompt(&state, &user, &req).await?;

    if !req.stream {
        let raw = state.ai.complete(&req.prompt).await?;
        let reply = parse_or_wrap(&raw);

        persist_assistant(&state, &conversation_id, reply.clone(), false).await?;

        let conversation_id: Uuid = conversation_id
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt conversation id: {e}")))?;
        return Ok(Json(ChatResponse { conversation_id, reply }).into_response());
    }

    let body = Body::from_stream(relay_stream(state, conversation_id, req.prompt));
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))
}

/// Full chat history: every conversation of the caller, oldest first,
/// with its complete message log.
pub async fn get_history(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ChatHistory>, ApiError> {
    let st = state.clone();
    let owner = user.id.to_string();

    let rows = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<(ConversationRow, Vec<MessageRow>)>> {
        st.db
            .list_conversations_by_created(&owner)?
            .into_iter()
            .map(|conv| {
                let messages = st.db.list_messages(&conv.id)?;
                Ok((conv, messages))
            })
            .collect()
    })
    .await??;

    let conversations = rows
        .into_iter()
        .map(|(conv, messages)| detail(conv, messages))
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(Json(ChatHistory { conversations }))
}

/// Reuse the supplied conversation when it exists under the caller's
/// ownership, otherwise create one titled after the prompt; then append
/// the prompt to the log.
async fn resolve_and_persist_prompt(
    state: &AppState,
    user: &CurrentUser,
    req: &ChatRequest,
) -> Result<String, ApiError> {
    let st = state.clone();
    let owner = user.id.to_string();
    let supplied = req.conversation_id.map(|id| id.to_string());
    let prompt = req.prompt.clone();

    let conversation_id = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let existing = match &supplied {
            Some(id) => st.db.get_conversation(id, &owner)?,
            None => None,
        };
        let conversation_id = match existing {
            Some(row) => row.id,
            None => {
                let title = derive_title(&prompt);
                st.db
                    .create_conversation(&Uuid::new_v4().to_string(), &owner, Some(&title))?
                    .id
            }
        };

        st.db.insert_message(
            &Uuid::new_v4().to_string(),
            &conversation_id,
            MessageRole::User.as_str(),
            &text_content(&prompt).to_string(),
            None,
        )?;

        Ok(conversation_id)
    })
    .await??;

    Ok(conversation_id)
}

async fn persist_assistant(
    state: &AppState,
    conversation_id: &str,
    content: Value,
    streamed: bool,
) -> Result<(), ApiError> {
    let st = state.clone();
    let conversation_id = conversation_id.to_string();
    let meta = json!({ "streamed": streamed }).to_string();

    tokio::task::spawn_blocking(move || {
        st.db.insert_message(
            &Uuid::new_v4().to_string(),
            &conversation_id,
            MessageRole::Assistant.as_str(),
            &content.to_string(),
            Some(&meta),
        )
    })
    .await??;

    Ok(())
}

/// The relay channel body. Runs for as long as the client keeps reading:
/// a disconnect drops this stream and ends the write loop at the next
/// yield, which in turn drops the upstream provider stream.
fn relay_stream(
    state: AppState,
    conversation_id: String,
    prompt: String,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    async_stream::stream! {
        let mut fragments = match state.ai.stream(&prompt).await {
            Ok(fragments) => fragments,
            Err(e) => {
                error!("failed to open AI stream: {e}");
                yield Ok(frame(RelayEvent::error("AI stream error")));
                return;
            }
        };

        let mut assistant_text = String::new();
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(chunk) => {
                    assistant_text.push_str(&chunk);
                    yield Ok(frame(RelayEvent::chunk(chunk)));
                }
                Err(e) => {
                    // partial text is discarded; the error event is the only trace
                    error!("error while streaming AI reply: {e}");
                    yield Ok(frame(RelayEvent::error("AI stream error")));
                    return;
                }
            }
        }

        // persist before the terminal marker so a client that hangs up on
        // `done` cannot race the write
        let content = parse_or_wrap(&assistant_text);
        if let Err(e) = persist_assistant(&state, &conversation_id, content, true).await {
            error!("failed to persist streamed assistant reply: {e}");
            yield Ok(frame(RelayEvent::error("AI stream error")));
            return;
        }

        yield Ok(frame(RelayEvent::done()));
    }
}

fn frame(event: RelayEvent) -> Bytes {
    Bytes::from(encode_frame(&event))
}

fn derive_title(prompt: &str) -> String {
    if prompt.chars().count() > TITLE_MAX_CHARS {
        let head: String = prompt.chars().take(TITLE_MAX_CHARS - 3).collect();
        format!("{head}...")
    } else {
        prompt.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_prompts_title_verbatim() {
        assert_eq!(derive_title("What is Rust?"), "What is Rust?");
    }

    #[test]
    fn long_prompts_truncate_with_ellipsis() {
        let prompt = "x".repeat(60);
        let title = derive_title(&prompt);
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
        assert!(title.starts_with(&"x".repeat(47)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let prompt = "é".repeat(60);
        let title = derive_title(&prompt);
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn boundary_prompt_is_untouched() {
        let prompt = "y".repeat(50);
        assert_eq!(derive_title(&prompt), prompt);
    }
}
