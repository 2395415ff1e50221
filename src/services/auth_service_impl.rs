//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::db::{CreateOutcome, Store};
use crate::services::auth_service::{Account, AuthError, AuthService, IssuedReset};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 50;

pub struct SeaOrmAuthService {
    store: Store,
    config: Arc<RwLock<Config>>,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, config: Arc<RwLock<Config>>) -> Self {
        Self { store, config }
    }

    fn validate_username(username: &str) -> Result<(), AuthError> {
        if username.is_empty() {
            return Err(AuthError::Validation("Username is required".to_string()));
        }
        if username.len() > MAX_USERNAME_LEN {
            return Err(AuthError::Validation(format!(
                "Username must be {MAX_USERNAME_LEN} characters or less"
            )));
        }
        Ok(())
    }

    fn validate_password(password: &str) -> Result<(), AuthError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let username = username.trim();
        Self::validate_username(username)?;
        Self::validate_password(password)?;

        let security = self.config.read().await.security.clone();

        match self.store.create_user(username, password, &security).await? {
            CreateOutcome::Created(user) => {
                info!(user_id = user.id, "User registered: {}", user.username);
                Ok(())
            }
            CreateOutcome::UsernameTaken => Err(AuthError::UsernameTaken),
        }
    }

    async fn login(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .store
            .verify_user_password(username, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        info!(user_id = user.id, "User logged in: {}", user.username);
        Ok(user.into())
    }

    async fn request_password_reset(&self, username: &str) -> Result<IssuedReset, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::Validation("Username is required".to_string()));
        }

        let Some(user) = self.store.get_user_by_username(username).await? else {
            // Same outward shape as the success path; nothing is created.
            return Ok(IssuedReset::NoAccount);
        };

        let ttl_minutes = self.config.read().await.security.reset_token_ttl_minutes;
        let token = generate_reset_token();
        let expires_at = (Utc::now() + Duration::minutes(ttl_minutes)).to_rfc3339();

        self.store
            .issue_reset_token(user.id, &token, &expires_at)
            .await?;

        // The token itself stays out of the logs.
        info!(user_id = user.id, "Password reset token issued");
        Ok(IssuedReset::Issued(token))
    }

    async fn redeem_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Self::validate_password(new_password)?;

        let user_id = self
            .store
            .consume_reset_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let security = self.config.read().await.security.clone();
        self.store
            .update_user_password(user_id, new_password, &security)
            .await?;

        info!(user_id, "Password reset completed");
        Ok(())
    }
}

/// Generate an unguessable reset token (64 character hex string, 256 bits).
#[must_use]
fn generate_reset_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
