//! End-to-end handler tests over an in-memory database and a scripted
//! AI gateway stub.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{Value, json};

use quill_ai::{AiError, CompletionClient, FragmentStream};
use quill_api::middleware::CurrentUser;
use quill_api::state::{AppState, AppStateInner};
use quill_api::{ApiError, auth, chat, conversations};
use quill_db::Database;
use quill_relay::{RelayDecoder, RelayEvent};
use quill_types::api::{
    ChatRequest, CreateConversationRequest, LoginRequest, RegisterRequest,
    UpdateConversationRequest,
};

/// What the stubbed provider should do for this test.
enum Script {
    Reply(&'static str),
    Fragments(&'static [&'static str]),
    FailAfter(&'static [&'static str]),
}

struct StubAi(Script);

#[async_trait]
impl CompletionClient for StubAi {
    async fn complete(&self, _prompt: &str) -> Result<String, AiError> {
        match &self.0 {
            Script::Reply(text) => Ok((*text).to_string()),
            _ => Err(AiError::Malformed("complete not scripted".into())),
        }
    }

    async fn stream(&self, _prompt: &str) -> Result<FragmentStream, AiError> {
        let items: Vec<Result<String, AiError>> = match &self.0 {
            Script::Fragments(parts) => parts.iter().map(|p| Ok((*p).to_string())).collect(),
            Script::FailAfter(parts) => parts
                .iter()
                .map(|p| Ok((*p).to_string()))
                .chain(std::iter::once(Err(AiError::Malformed("provider blew up".into()))))
                .collect(),
            Script::Reply(_) => return Err(AiError::Malformed("stream not scripted".into())),
        };
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}

fn state_with(script: Script) -> AppState {
    AppStateInner::new(
        Database::open_in_memory().unwrap(),
        Arc::new(StubAi(script)),
        Duration::hours(24),
    )
}

async fn register(state: &AppState, username: &str, email: &str) -> (CookieJar, CurrentUser) {
    let (jar, (status, Json(res))) = auth::register(
        State(state.clone()),
        CookieJar::new(),
        Json(RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: "hunter22".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let user = CurrentUser {
        id: res.user.id,
        username: res.user.username,
        email: res.user.email,
    };
    (jar, user)
}

async fn collect_body(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

// -- Auth --

#[tokio::test]
async fn register_then_login_returns_the_same_user() {
    let state = state_with(Script::Reply("unused"));
    let (_, alice) = register(&state, "alice", "alice@example.com").await;

    let (_jar, Json(login)) = auth::login(
        State(state.clone()),
        CookieJar::new(),
        Json(LoginRequest {
            email: "alice@example.com".into(),
            password: "hunter22".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(login.user.id, alice.id);

    // only a hash is stored, never the plaintext
    let row = state.db.get_user_by_email("alice@example.com").unwrap().unwrap();
    assert_ne!(row.password, "hunter22");
    assert!(row.password.starts_with("$argon2"));
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let state = state_with(Script::Reply("unused"));
    register(&state, "alice", "alice@example.com").await;

    let err = auth::login(
        State(state.clone()),
        CookieJar::new(),
        Json(LoginRequest {
            email: "alice@example.com".into(),
            password: "wrong-password".into(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let state = state_with(Script::Reply("unused"));
    register(&state, "alice", "alice@example.com").await;

    let err = auth::register(
        State(state.clone()),
        CookieJar::new(),
        Json(RegisterRequest {
            username: "alice".into(),
            email: "fresh@example.com".into(),
            password: "hunter22".into(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn session_survives_check_until_logout() {
    let state = state_with(Script::Reply("unused"));
    let (jar, _) = register(&state, "alice", "alice@example.com").await;

    let Json(check) = auth::check(State(state.clone()), jar.clone()).await.unwrap();
    assert!(check.is_authenticated);

    auth::logout(State(state.clone()), jar.clone()).await.unwrap();

    // the session row is gone server-side, so even the old cookie is dead
    let Json(check) = auth::check(State(state.clone()), jar).await.unwrap();
    assert!(!check.is_authenticated);
    assert!(check.user.is_none());
}

// -- Chat orchestration --

#[tokio::test]
async fn non_streaming_dispatch_persists_both_messages() {
    let state = state_with(Script::Reply("4"));
    let (_, alice) = register(&state, "alice", "alice@example.com").await;

    let response = chat::handle_chat(
        State(state.clone()),
        Extension(alice.clone()),
        Json(ChatRequest {
            prompt: "2+2?".into(),
            conversation_id: None,
            stream: false,
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(&collect_body(response).await).unwrap();
    assert_eq!(body["reply"], json!({ "text": "4" }));
    let conversation_id = body["conversationId"].as_str().unwrap().to_string();

    let log = state.db.list_messages(&conversation_id).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, "user");
    assert_eq!(
        serde_json::from_str::<Value>(&log[0].content).unwrap(),
        json!({ "text": "2+2?" })
    );
    assert_eq!(log[1].role, "assistant");
    assert_eq!(
        serde_json::from_str::<Value>(&log[1].content).unwrap(),
        json!({ "text": "4" })
    );
    let meta: Value = serde_json::from_str(log[1].meta.as_deref().unwrap()).unwrap();
    assert_eq!(meta["streamed"], json!(false));
}

#[tokio::test]
async fn streaming_dispatch_relays_and_persists_the_accumulated_reply() {
    let state = state_with(Script::Fragments(&["He", "llo"]));
    let (_, alice) = register(&state, "alice", "alice@example.com").await;

    let response = chat::handle_chat(
        State(state.clone()),
        Extension(alice.clone()),
        Json(ChatRequest {
            prompt: "greet me".into(),
            conversation_id: None,
            stream: true,
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        response.headers()[axum::http::header::CONTENT_TYPE],
        "text/event-stream; charset=utf-8"
    );

    let mut decoder = RelayDecoder::new();
    let events = decoder.feed(&collect_body(response).await).unwrap();
    assert_eq!(
        events,
        vec![
            RelayEvent::chunk("He"),
            RelayEvent::chunk("llo"),
            RelayEvent::done(),
        ]
    );

    let convs = state.db.list_conversations(&alice.id.to_string()).unwrap();
    assert_eq!(convs.len(), 1);
    assert_eq!(convs[0].title.as_deref(), Some("greet me"));

    let log = state.db.list_messages(&convs[0].id).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].role, "assistant");
    assert_eq!(
        serde_json::from_str::<Value>(&log[1].content).unwrap(),
        json!({ "text": "Hello" })
    );
    let meta: Value = serde_json::from_str(log[1].meta.as_deref().unwrap()).unwrap();
    assert_eq!(meta["streamed"], json!(true));
}

#[tokio::test]
async fn failed_stream_discards_partial_text_and_emits_one_error() {
    let state = state_with(Script::FailAfter(&["par", "tial"]));
    let (_, alice) = register(&state, "alice", "alice@example.com").await;

    let response = chat::handle_chat(
        State(state.clone()),
        Extension(alice.clone()),
        Json(ChatRequest {
            prompt: "doomed".into(),
            conversation_id: None,
            stream: true,
        }),
    )
    .await
    .unwrap();

    let mut decoder = RelayDecoder::new();
    let events = decoder.feed(&collect_body(response).await).unwrap();

    let errors = events
        .iter()
        .filter(|e| matches!(e, RelayEvent::Error { .. }))
        .count();
    assert_eq!(errors, 1);
    assert!(!events.contains(&RelayEvent::done()));
    assert_eq!(*events.last().unwrap(), RelayEvent::error("AI stream error"));

    // the prompt stays durable; no assistant message was recorded
    let convs = state.db.list_conversations(&alice.id.to_string()).unwrap();
    let log = state.db.list_messages(&convs[0].id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].role, "user");
}

#[tokio::test]
async fn supplied_conversation_is_reused() {
    let state = state_with(Script::Reply("ok"));
    let (_, alice) = register(&state, "alice", "alice@example.com").await;

    let first = chat::handle_chat(
        State(state.clone()),
        Extension(alice.clone()),
        Json(ChatRequest {
            prompt: "first".into(),
            conversation_id: None,
            stream: false,
        }),
    )
    .await
    .unwrap();
    let body: Value = serde_json::from_slice(&collect_body(first).await).unwrap();
    let conversation_id = body["conversationId"].as_str().unwrap().parse().unwrap();

    chat::handle_chat(
        State(state.clone()),
        Extension(alice.clone()),
        Json(ChatRequest {
            prompt: "second".into(),
            conversation_id: Some(conversation_id),
            stream: false,
        }),
    )
    .await
    .unwrap();

    let log = state.db.list_messages(&conversation_id.to_string()).unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(state.db.list_conversations(&alice.id.to_string()).unwrap().len(), 1);
}

// -- Ownership isolation --

#[tokio::test]
async fn conversations_are_invisible_across_users() {
    let state = state_with(Script::Reply("ok"));
    let (_, alice) = register(&state, "alice", "alice@example.com").await;
    let (_, bob) = register(&state, "bob", "bob@example.com").await;

    let (status, Json(created)) = conversations::create(
        State(state.clone()),
        Extension(alice.clone()),
        Json(CreateConversationRequest { title: Some("alice's".into()) }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let err = conversations::get_one(
        State(state.clone()),
        Extension(bob.clone()),
        axum::extract::Path(created.id),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = conversations::update(
        State(state.clone()),
        Extension(bob.clone()),
        axum::extract::Path(created.id),
        Json(UpdateConversationRequest { title: "stolen".into() }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = conversations::delete(
        State(state.clone()),
        Extension(bob.clone()),
        axum::extract::Path(created.id),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let Json(listed) = conversations::list(State(state.clone()), Extension(bob.clone()))
        .await
        .unwrap();
    assert!(listed.conversations.is_empty());

    // chatting "into" someone else's conversation silently starts a new one
    chat::handle_chat(
        State(state.clone()),
        Extension(bob.clone()),
        Json(ChatRequest {
            prompt: "hijack attempt".into(),
            conversation_id: Some(created.id),
            stream: false,
        }),
    )
    .await
    .unwrap();
    assert!(state.db.list_messages(&created.id.to_string()).unwrap().is_empty());
}
