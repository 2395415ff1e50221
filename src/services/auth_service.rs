//! Domain service for accounts, credentials, and password resets.

use serde::Serialize;
use thiserror::Error;

use crate::domain::Role;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage unavailable")]
    Unavailable,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        if crate::db::is_unavailable(&err) {
            Self::Unavailable
        } else {
            Self::Database(err.to_string())
        }
    }
}

/// Public view of an account; what login and /me return.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl From<crate::db::User> for Account {
    fn from(user: crate::db::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
        }
    }
}

/// Result of a reset request. The response shape is identical whether or not
/// the username exists; the token is only surfaced to the HTTP layer so dev
/// builds can echo it.
#[derive(Debug, Clone)]
pub enum IssuedReset {
    /// Token created for a real account.
    Issued(String),
    /// Unknown username; nothing was created.
    NoAccount,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Create a new account with role `user`. Does not log the caller in.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UsernameTaken`] when the name is in use.
    async fn register(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Verify credentials. Unknown usernames and wrong passwords fail with
    /// the same error so responses cannot be used to enumerate accounts.
    async fn login(&self, username: &str, password: &str) -> Result<Account, AuthError>;

    /// Issue a single-use reset token, invalidating any earlier one for the
    /// same account. Never errors on unknown usernames.
    async fn request_password_reset(&self, username: &str) -> Result<IssuedReset, AuthError>;

    /// Redeem a reset token exactly once and replace the password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for unknown, expired, or
    /// already-consumed tokens.
    async fn redeem_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
}
