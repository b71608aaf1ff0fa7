//! Database row types — these map directly to SQLite rows.
//! Distinct from quill-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    /// JSON text; the API layer parses it into a structured value.
    pub content: String,
    pub meta: Option<String>,
    pub created_at: DateTime<Utc>,
}
