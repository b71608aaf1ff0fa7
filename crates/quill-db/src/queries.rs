use crate::Database;
use crate::models::{ConversationRow, MessageRow, SessionRow, UserRow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, email, password_hash, Utc::now()],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Registration duplicate check: matches the original's `username OR email`.
    pub fn username_or_email_taken(&self, username: &str, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
                (username, email),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    // -- Sessions --

    pub fn create_session(&self, id: &str, user_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, user_id, Utc::now(), expires_at],
            )?;
            Ok(())
        })
    }

    /// Unexpired sessions only; an expired row behaves as missing.
    pub fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, created_at, expires_at FROM sessions
                     WHERE id = ?1 AND expires_at > ?2",
                    rusqlite::params![id, Utc::now()],
                    |row| {
                        Ok(SessionRow {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            created_at: row.get(2)?,
                            expires_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn delete_expired_sessions(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                rusqlite::params![Utc::now()],
            )?;
            Ok(removed)
        })
    }

    // -- Conversations --

    pub fn create_conversation(&self, id: &str, user_id: &str, title: Option<&str>) -> Result<ConversationRow> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, user_id, title, now, now],
            )?;
            Ok(ConversationRow {
                id: id.to_string(),
                user_id: user_id.to_string(),
                title: title.map(str::to_string),
                created_at: now,
                updated_at: now,
            })
        })
    }

    /// Scoped by owner: a conversation belonging to someone else is simply
    /// not found.
    pub fn get_conversation(&self, id: &str, user_id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, title, created_at, updated_at FROM conversations
                     WHERE id = ?1 AND user_id = ?2",
                    (id, user_id),
                    map_conversation,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Most recent activity first, for the sidebar.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            query_conversations(
                conn,
                user_id,
                "SELECT id, user_id, title, created_at, updated_at FROM conversations
                 WHERE user_id = ?1 ORDER BY updated_at DESC, rowid DESC",
            )
        })
    }

    /// Oldest first, for the full history view.
    pub fn list_conversations_by_created(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            query_conversations(
                conn,
                user_id,
                "SELECT id, user_id, title, created_at, updated_at FROM conversations
                 WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )
        })
    }

    pub fn update_conversation_title(&self, id: &str, user_id: &str, title: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
                rusqlite::params![title, Utc::now(), id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_conversation(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(removed > 0)
        })
    }

    // -- Messages --

    /// Append to the log and bump the parent's activity timestamp.
    /// The log itself is never updated or reordered.
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        role: &str,
        content: &str,
        meta: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, meta, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, conversation_id, role, content, meta, now],
            )?;
            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, conversation_id],
            )?;
            Ok(())
        })
    }

    /// Full ordered log, oldest first. The rowid tiebreak keeps same-instant
    /// appends in insertion order.
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, meta, created_at FROM messages
                 WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([conversation_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn last_message(&self, conversation_id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, conversation_id, role, content, meta, created_at FROM messages
                     WHERE conversation_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    [conversation_id],
                    map_message,
                )
                .optional()?;
            Ok(row)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT id, username, email, password, created_at FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversations(conn: &Connection, user_id: &str, sql: &str) -> Result<Vec<ConversationRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([user_id], map_conversation)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        meta: row.get(4)?,
        created_at: row.get(5)?,
    })
}
