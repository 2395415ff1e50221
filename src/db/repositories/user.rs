use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::domain::Role;
use crate::entities::{prelude::*, users};

/// Account data returned from the repository. The password hash never leaves
/// this module.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<users::Model> for User {
    type Error = anyhow::Error;

    fn try_from(model: users::Model) -> Result<Self> {
        let role = model
            .role
            .parse::<Role>()
            .with_context(|| format!("User {} has a corrupt role column", model.id))?;

        Ok(Self {
            id: model.id,
            username: model.username,
            role,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

/// Outcome of an insert attempt against the unique username column.
pub enum CreateOutcome {
    Created(User),
    UsernameTaken,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert a new account with role `user`. Duplicate usernames are
    /// detected from the unique constraint, not a read-then-write check, so
    /// two concurrent registrations cannot both succeed.
    pub async fn create(
        &self,
        username: &str,
        password: &str,
        config: &SecurityConfig,
    ) -> Result<CreateOutcome> {
        let password = password.to_string();
        let config = config.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();
        let active = users::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash),
            role: Set(Role::User.as_str().to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        match active.insert(&self.conn).await {
            Ok(model) => Ok(CreateOutcome::Created(model.try_into()?)),
            Err(err) => match err.sql_err() {
                Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => {
                    Ok(CreateOutcome::UsernameTaken)
                }
                _ => Err(err).context("Failed to insert user"),
            },
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>> {
        let user = Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by id")?;

        user.map(User::try_from).transpose()
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = Users::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        user.map(User::try_from).transpose()
    }

    /// Verify a password and return the account on success.
    /// Runs Argon2 in `spawn_blocking`; verification is CPU-bound and would
    /// stall the async runtime if run inline.
    pub async fn verify_password(&self, username: &str, password: &str) -> Result<Option<User>> {
        let model = Users::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(model) = model else {
            return Ok(None);
        };

        let password_hash = model.password_hash.clone();
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        if is_valid {
            Ok(Some(model.try_into()?))
        } else {
            Ok(None)
        }
    }

    /// Replace a user's password hash (used by reset redemption).
    pub async fn update_password(
        &self,
        user_id: i64,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<()> {
        let user = Users::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User {user_id} not found"))?;

        let password = new_password.to_string();
        let config = config.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .context("Password hashing task panicked")??;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let rows = Users::find()
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        rows.into_iter().map(User::try_from).collect()
    }

    /// Set a user's role. Returns the updated account, or None if no such
    /// user exists.
    pub async fn set_role(&self, user_id: i64, role: Role) -> Result<Option<User>> {
        let Some(user) = Users::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for role change")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.role = Set(role.as_str().to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        let updated = active.update(&self.conn).await?;

        Ok(Some(updated.try_into()?))
    }
}

/// Hash a password using Argon2id with the configured cost parameters.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
