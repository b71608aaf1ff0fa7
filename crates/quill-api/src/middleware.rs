use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use quill_types::api::UserProfile;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "quill_session";

/// The authenticated caller, resolved from the session cookie and stashed
/// as a request extension by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl CurrentUser {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// Reject requests without a live session.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_session(&state, &jar)
        .await?
        .ok_or(ApiError::Unauthorized("Please log in to access this resource"))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Resolve the session cookie to its user, if any.
///
/// A live session pointing at a deleted account is removed on sight and
/// treated as unauthenticated.
pub async fn resolve_session(state: &AppState, jar: &CookieJar) -> Result<Option<CurrentUser>, ApiError> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let session_id = cookie.value().to_string();

    let state = state.clone();
    let resolved = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<CurrentUser>> {
        let Some(session) = state.db.get_session(&session_id)? else {
            return Ok(None);
        };
        match state.db.get_user_by_id(&session.user_id)? {
            Some(user) => Ok(Some(CurrentUser {
                id: user.id.parse()?,
                username: user.username,
                email: user.email,
            })),
            None => {
                state.db.delete_session(&session_id)?;
                Ok(None)
            }
        }
    })
    .await??;

    Ok(resolved)
}
