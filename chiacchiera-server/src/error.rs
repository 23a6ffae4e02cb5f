//! Error taxonomy shared by the HTTP API and the real-time gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chiacchiera_core::error::{codes, Error as WireError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Group or message absent, or already in a terminal state for the transition.
    #[error("not found: {0}")]
    NotFound(String),

    /// Actor lacks rights for the action (membership or authorship).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing or invalid credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ChatError::NotFound(what.into())
    }

    pub fn unauthorized(why: impl Into<String>) -> Self {
        ChatError::Unauthorized(why.into())
    }

    pub fn invalid(why: impl Into<String>) -> Self {
        ChatError::InvalidArgument(why.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ChatError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ChatError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ChatError::Conflict(_) => StatusCode::CONFLICT,
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ChatError::NotFound(_) => codes::NOT_FOUND,
            ChatError::Unauthorized(_) => codes::UNAUTHORIZED,
            ChatError::InvalidArgument(_) => codes::INVALID_ARGUMENT,
            ChatError::Unauthenticated(_) => codes::UNAUTHENTICATED,
            ChatError::Conflict(_) => codes::CONFLICT,
            ChatError::Internal(_) => codes::INTERNAL,
        }
    }

    /// Body sent to clients, over HTTP or inside an error ack.
    pub fn to_wire(&self) -> WireError {
        let message = match self {
            // infrastructure details stay in the server log
            ChatError::Internal(_) => "internal server error".to_string(),
            ChatError::NotFound(m)
            | ChatError::Unauthorized(m)
            | ChatError::InvalidArgument(m)
            | ChatError::Unauthenticated(m)
            | ChatError::Conflict(m) => m.clone(),
        };
        WireError::new(self.code(), message)
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(e: sqlx::Error) -> Self {
        ChatError::Internal(format!("db error: {}", e))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Internal(format!("serialization error: {}", e))
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        if let ChatError::Internal(ref detail) = self {
            tracing::error!(error = %detail, "request failed");
        }
        (self.status(), Json(self.to_wire())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
