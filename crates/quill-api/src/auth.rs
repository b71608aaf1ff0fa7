use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use quill_types::api::{
    AuthResponse, CheckAuthResponse, LoginRequest, RegisterRequest, UserProfile,
};

use crate::error::ApiError;
use crate::middleware::{CurrentUser, SESSION_COOKIE, resolve_session};
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(CookieJar, (StatusCode, Json<AuthResponse>)), ApiError> {
    validate_register(&req)?;

    let ttl = state.session_ttl;
    let st = state.clone();
    let (profile, session_id) = tokio::task::spawn_blocking(move || -> Result<(UserProfile, String), ApiError> {
        if st.db.username_or_email_taken(&req.username, &req.email)? {
            return Err(ApiError::Conflict("Username or email already taken"));
        }

        // Argon2id; only the PHC string is ever stored
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?
            .to_string();

        let user_id = Uuid::new_v4();
        st.db.create_user(&user_id.to_string(), &req.username, &req.email, &hash)?;

        let session_id = Uuid::new_v4().to_string();
        st.db.create_session(&session_id, &user_id.to_string(), Utc::now() + ttl)?;

        Ok((
            UserProfile {
                id: user_id,
                username: req.username,
                email: req.email,
            },
            session_id,
        ))
    })
    .await??;

    info!("registered user {}", profile.username);

    Ok((
        jar.add(session_cookie(session_id)),
        (StatusCode::CREATED, Json(AuthResponse { user: profile })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let ttl = state.session_ttl;
    let st = state.clone();
    let (profile, session_id) = tokio::task::spawn_blocking(move || -> Result<(UserProfile, String), ApiError> {
        // Unknown email and wrong password are indistinguishable to the caller
        let user = st
            .db
            .get_user_by_email(&req.email)?
            .ok_or(ApiError::Unauthorized("Email or password is incorrect"))?;

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored password hash is corrupt: {e}")))?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized("Email or password is incorrect"))?;

        let user_id: Uuid = user
            .id
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt user id: {e}")))?;

        let session_id = Uuid::new_v4().to_string();
        st.db.create_session(&session_id, &user.id, Utc::now() + ttl)?;

        Ok((
            UserProfile {
                id: user_id,
                username: user.username,
                email: user.email,
            },
            session_id,
        ))
    })
    .await??;

    info!("user {} logged in", profile.username);

    Ok((
        jar.add(session_cookie(session_id)),
        Json(AuthResponse { user: profile }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let session_id = cookie.value().to_string();
        let st = state.clone();
        tokio::task::spawn_blocking(move || st.db.delete_session(&session_id)).await??;
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok((jar, Json(json!({ "success": true, "message": "Logout successful" }))))
}

pub async fn check(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<CheckAuthResponse>, ApiError> {
    let user = resolve_session(&state, &jar).await?;
    Ok(Json(CheckAuthResponse {
        is_authenticated: user.is_some(),
        user: user.map(|u| u.profile()),
    }))
}

pub async fn me(Extension(user): Extension<CurrentUser>) -> Json<AuthResponse> {
    Json(AuthResponse { user: user.profile() })
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn validate_register(req: &RegisterRequest) -> Result<(), ApiError> {
    let username_len = req.username.chars().count();
    if !(3..=50).contains(&username_len) {
        return Err(ApiError::Validation(
            "Username must be between 3 and 50 characters".into(),
        ));
    }
    if !is_valid_email(&req.email) {
        return Err(ApiError::Validation("Invalid email address".into()));
    }
    let password_len = req.password.chars().count();
    if !(6..=100).contains(&password_len) {
        return Err(ApiError::Validation(
            "Password must be between 6 and 100 characters".into(),
        ));
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("user.name+tag@sub.example.com"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@missing.local"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.leading"));
        assert!(!is_valid_email("has space@x.co"));
    }
}
