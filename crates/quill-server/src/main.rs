use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use quill_ai::{AiConfig, OpenAiClient};
use quill_api::middleware::require_auth;
use quill_api::state::{AppState, AppStateInner};
use quill_api::{auth, chat, conversations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("QUILL_DB_PATH").unwrap_or_else(|_| "quill.db".into());
    let host = std::env::var("QUILL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("QUILL_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let session_ttl_hours: i64 = std::env::var("QUILL_SESSION_TTL_HOURS")
        .unwrap_or_else(|_| "24".into())
        .parse()?;

    // Init database
    let db = quill_db::Database::open(&PathBuf::from(&db_path))?;
    let reaped = db.delete_expired_sessions()?;
    if reaped > 0 {
        info!("reaped {reaped} expired sessions");
    }

    // AI gateway; a missing API key fails at call time, not startup
    let ai_config = AiConfig::from_env();
    if ai_config.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; chat requests will fail upstream");
    }
    let ai = OpenAiClient::new(ai_config)?;

    let state: AppState = AppStateInner::new(db, Arc::new(ai), chrono::Duration::hours(session_ttl_hours));

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/check", get(auth::check))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/chat", post(chat::handle_chat))
        .route("/chat", get(chat::get_history))
        .route("/conversations", get(conversations::list))
        .route("/conversations", post(conversations::create))
        .route("/conversations/{id}", get(conversations::get_one))
        .route("/conversations/{id}", axum::routing::patch(conversations::update))
        .route("/conversations/{id}", axum::routing::delete(conversations::delete))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Quill server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
