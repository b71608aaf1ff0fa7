use std::sync::Arc;

use chrono::Duration;

use quill_ai::CompletionClient;
use quill_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub ai: Arc<dyn CompletionClient>,
    pub session_ttl: Duration,
}

impl AppStateInner {
    pub fn new(db: Database, ai: Arc<dyn CompletionClient>, session_ttl: Duration) -> AppState {
        Arc::new(Self { db, ai, session_ttl })
    }
}
