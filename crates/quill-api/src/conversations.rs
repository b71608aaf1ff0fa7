use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

use quill_db::models::{ConversationRow, MessageRow};
use quill_types::api::{
    ConversationDetail, ConversationList, ConversationSummary, ConversationView,
    CreateConversationRequest, MessagePreview, MessageView, UpdateConversationRequest,
};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

const DEFAULT_TITLE: &str = "New Conversation";
const NOT_FOUND: &str = "The requested conversation does not exist or you do not have access to it";

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ConversationList>, ApiError> {
    let st = state.clone();
    let owner = user.id.to_string();

    let rows = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<(ConversationRow, Option<MessageRow>)>> {
        st.db
            .list_conversations(&owner)?
            .into_iter()
            .map(|conv| {
                let last = st.db.last_message(&conv.id)?;
                Ok((conv, last))
            })
            .collect()
    })
    .await??;

    let conversations = rows
        .into_iter()
        .map(|(conv, last)| summary(conv, last))
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(Json(ConversationList { conversations }))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationView>), ApiError> {
    let title = match req.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => DEFAULT_TITLE.to_string(),
    };

    let st = state.clone();
    let owner = user.id.to_string();
    let row = tokio::task::spawn_blocking(move || {
        st.db.create_conversation(&Uuid::new_v4().to_string(), &owner, Some(&title))
    })
    .await??;

    Ok((StatusCode::CREATED, Json(view(row)?)))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let st = state.clone();
    let owner = user.id.to_string();

    let found = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<(ConversationRow, Vec<MessageRow>)>> {
        let Some(conv) = st.db.get_conversation(&id.to_string(), &owner)? else {
            return Ok(None);
        };
        let messages = st.db.list_messages(&conv.id)?;
        Ok(Some((conv, messages)))
    })
    .await??;

    let (conv, messages) = found.ok_or(ApiError::NotFound(NOT_FOUND))?;
    Ok(Json(detail(conv, messages)?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateConversationRequest>,
) -> Result<Json<ConversationView>, ApiError> {
    let st = state.clone();
    let owner = user.id.to_string();

    let row = tokio::task::spawn_blocking(move || -> Result<ConversationRow, ApiError> {
        let updated = st.db.update_conversation_title(&id.to_string(), &owner, &req.title)?;
        if !updated {
            return Err(ApiError::NotFound(NOT_FOUND));
        }
        st.db
            .get_conversation(&id.to_string(), &owner)?
            .ok_or(ApiError::NotFound(NOT_FOUND))
    })
    .await??;

    Ok(Json(view(row)?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let st = state.clone();
    let owner = user.id.to_string();

    let removed =
        tokio::task::spawn_blocking(move || st.db.delete_conversation(&id.to_string(), &owner)).await??;

    if !removed {
        return Err(ApiError::NotFound(NOT_FOUND));
    }
    Ok(Json(json!({ "success": true, "message": "Conversation deleted successfully" })))
}

// -- Row-to-DTO conversion, shared with the chat history view --

pub(crate) fn view(row: ConversationRow) -> Result<ConversationView, ApiError> {
    Ok(ConversationView {
        id: parse_id(&row.id)?,
        title: row.title,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub(crate) fn summary(row: ConversationRow, last: Option<MessageRow>) -> Result<ConversationSummary, ApiError> {
    let last_message = last
        .map(|m| -> Result<MessagePreview, ApiError> {
            Ok(MessagePreview {
                content: parse_json(&m.content)?,
                created_at: m.created_at,
            })
        })
        .transpose()?;

    Ok(ConversationSummary {
        id: parse_id(&row.id)?,
        title: row.title,
        created_at: row.created_at,
        updated_at: row.updated_at,
        last_message,
    })
}

pub(crate) fn detail(row: ConversationRow, messages: Vec<MessageRow>) -> Result<ConversationDetail, ApiError> {
    Ok(ConversationDetail {
        id: parse_id(&row.id)?,
        title: row.title,
        created_at: row.created_at,
        updated_at: row.updated_at,
        messages: messages.into_iter().map(message_view).collect::<Result<_, _>>()?,
    })
}

pub(crate) fn message_view(row: MessageRow) -> Result<MessageView, ApiError> {
    Ok(MessageView {
        id: parse_id(&row.id)?,
        role: row
            .role
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt message role: {e}")))?,
        content: parse_json(&row.content)?,
        meta: row.meta.as_deref().map(parse_json).transpose()?,
        created_at: row.created_at,
    })
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    id.parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt row id: {e}")))
}

fn parse_json(raw: &str) -> Result<Value, ApiError> {
    serde_json::from_str(raw).map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt stored JSON: {e}")))
}
