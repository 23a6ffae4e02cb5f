//! Authentication collaborator: credential issuance (register/login) and token lookup.
//! The message core only consumes the resulting `User`; it never looks at tokens itself.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, request::Parts};
use axum::extract::FromRequestParts;
use chiacchiera_core::{models::User, utils::new_id, now_timestamp};
use sha2::{Digest, Sha256};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::{ChatError, Result};
use crate::AppState;

pub const DEFAULT_ROLE: &str = "user";

// hash semplice della password
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        avatar_url: row.try_get("avatar_url")?,
        role: row.try_get("role")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Creates a user and returns it with a fresh token. `Conflict` if the username is taken.
pub async fn register_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    avatar_url: Option<&str>,
) -> Result<(User, String)> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ChatError::invalid("username and password are required"));
    }
    // controllo se lo username esiste già
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Err(ChatError::Conflict("username already exists".to_string()));
    }

    let user = User {
        user_id: new_id(),
        username: username.to_string(),
        avatar_url: avatar_url.map(str::to_string),
        role: DEFAULT_ROLE.to_string(),
        created_at: now_timestamp(),
    };
    let token = new_id();

    let inserted = sqlx::query(
        "INSERT INTO users (user_id, username, password_hash, token, avatar_url, role, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.user_id)
    .bind(&user.username)
    .bind(hash_password(password))
    .bind(&token)
    .bind(&user.avatar_url)
    .bind(&user.role)
    .bind(&user.created_at)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => Ok((user, token)),
        // two concurrent registrations with the same name: the UNIQUE constraint decides
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(ChatError::Conflict("username already exists".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Verifies credentials and rotates the token.
pub async fn login_user(pool: &SqlitePool, username: &str, password: &str) -> Result<(User, String)> {
    let row = sqlx::query(
        "SELECT user_id, username, avatar_url, role, created_at, password_hash FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    let row = row.ok_or_else(|| ChatError::not_found("user not found"))?;

    let stored_hash: String = row.try_get("password_hash")?;
    if hash_password(password) != stored_hash {
        return Err(ChatError::Unauthenticated("invalid credentials".to_string()));
    }
    let user = user_from_row(&row)?;

    // genera token nuovo e aggiorna
    let token = new_id();
    sqlx::query("UPDATE users SET token = ? WHERE user_id = ?")
        .bind(&token)
        .bind(&user.user_id)
        .execute(pool)
        .await?;
    Ok((user, token))
}

/// Resolves a bearer token to its user, `None` if the token is unknown.
pub async fn user_for_token(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT user_id, username, avatar_url, role, created_at FROM users WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn user_exists(pool: &SqlitePool, user_id: &str) -> Result<bool> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(n > 0)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticated caller of an HTTP request, from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let state = parts
            .extensions
            .get::<Arc<AppState>>()
            .cloned()
            .ok_or_else(|| ChatError::Internal("application state missing".to_string()))?;
        let token = bearer_token(parts)
            .ok_or_else(|| ChatError::Unauthenticated("missing bearer token".to_string()))?;
        match user_for_token(&state.pool, token).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(ChatError::Unauthenticated("invalid token".to_string())),
        }
    }
}
