use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::{AdminError, AuthError, TicketError};

/// Wire-level error taxonomy. Every failure path in the service layer maps
/// onto exactly one of these; the status code and the visible message are
/// decided here and nowhere else.
#[derive(Debug)]
pub enum ApiError {
    /// No session, or the session expired.
    Unauthenticated(String),

    /// Authenticated but the policy says no.
    Forbidden,

    NotFound(String),

    /// Duplicate username or a concurrent-update collision.
    Conflict(String),

    ValidationError(String),

    InvalidTransition(String),

    InvalidAssignee(String),

    /// Unknown, expired, or already-consumed reset token.
    InvalidToken,

    PayloadTooLarge(String),

    /// Transient storage failure; the request is safe to retry.
    Unavailable,

    DatabaseError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated(msg) => write!(f, "Unauthenticated: {msg}"),
            Self::Forbidden => write!(f, "Forbidden"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::InvalidTransition(msg) => write!(f, "Invalid transition: {msg}"),
            Self::InvalidAssignee(msg) => write!(f, "Invalid assignee: {msg}"),
            Self::InvalidToken => write!(f, "Invalid or expired token"),
            Self::PayloadTooLarge(msg) => write!(f, "Payload too large: {msg}"),
            Self::Unavailable => write!(f, "Service unavailable"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::ValidationError(msg)
            | Self::InvalidTransition(msg)
            | Self::InvalidAssignee(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::InvalidToken => (
                StatusCode::BAD_REQUEST,
                "Invalid or expired token".to_string(),
            ),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            Self::Unavailable => {
                tracing::warn!("Storage unavailable while serving a request");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable, please retry".to_string(),
                )
            }
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(format!("{resource} {id} not found"))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                Self::Unauthenticated("Invalid credentials".to_string())
            }
            AuthError::UsernameTaken => Self::Conflict("Username is already taken".to_string()),
            AuthError::InvalidToken => Self::InvalidToken,
            AuthError::Validation(msg) => Self::ValidationError(msg),
            AuthError::Unavailable => Self::Unavailable,
            AuthError::Database(msg) => Self::DatabaseError(msg),
            AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<TicketError> for ApiError {
    fn from(err: TicketError) -> Self {
        match err {
            TicketError::NotFound => Self::NotFound("Ticket not found".to_string()),
            TicketError::Forbidden => Self::Forbidden,
            TicketError::Validation(msg) => Self::ValidationError(msg),
            TicketError::InvalidTransition { from, to } => {
                Self::InvalidTransition(format!("Cannot move ticket from {from} to {to}"))
            }
            TicketError::InvalidAssignee(id) => {
                Self::InvalidAssignee(format!("User {id} cannot be assigned tickets"))
            }
            TicketError::Conflict => {
                Self::Conflict("Ticket was modified concurrently, retry".to_string())
            }
            TicketError::PayloadTooLarge { limit } => {
                Self::PayloadTooLarge(format!("File exceeds the {limit} byte upload limit"))
            }
            TicketError::Unavailable => Self::Unavailable,
            TicketError::Database(msg) => Self::DatabaseError(msg),
            TicketError::AuditFailed => {
                Self::InternalError("Audit trail write failed".to_string())
            }
            TicketError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotFound => Self::NotFound("User not found".to_string()),
            AdminError::Forbidden => Self::Forbidden,
            AdminError::Unavailable => Self::Unavailable,
            AdminError::Database(msg) => Self::DatabaseError(msg),
            AdminError::AuditFailed => {
                Self::InternalError("Audit trail write failed".to_string())
            }
        }
    }
}
