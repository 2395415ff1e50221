use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};

use crate::entities::{password_reset_tokens, prelude::*};

pub struct ResetTokenRepository {
    conn: DatabaseConnection,
}

impl ResetTokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Store a fresh token for the user, invalidating any prior unconsumed
    /// tokens so only the latest one is redeemable.
    pub async fn issue(&self, user_id: i64, token: &str, expires_at: &str) -> Result<()> {
        PasswordResetTokens::update_many()
            .filter(password_reset_tokens::Column::UserId.eq(user_id))
            .filter(password_reset_tokens::Column::Used.eq(false))
            .col_expr(password_reset_tokens::Column::Used, Expr::value(true))
            .exec(&self.conn)
            .await
            .context("Failed to invalidate prior reset tokens")?;

        let active = password_reset_tokens::ActiveModel {
            user_id: Set(user_id),
            token: Set(token.to_string()),
            expires_at: Set(expires_at.to_string()),
            used: Set(false),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert reset token")?;
        Ok(())
    }

    /// Atomically consume a token: the conditional UPDATE flips `used` only
    /// for a live token, so under concurrent redemption exactly one caller
    /// sees a row affected. Returns the owning user id on success.
    pub async fn consume(&self, token: &str) -> Result<Option<i64>> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = PasswordResetTokens::update_many()
            .filter(password_reset_tokens::Column::Token.eq(token))
            .filter(password_reset_tokens::Column::Used.eq(false))
            .filter(password_reset_tokens::Column::ExpiresAt.gt(now))
            .col_expr(password_reset_tokens::Column::Used, Expr::value(true))
            .exec(&self.conn)
            .await
            .context("Failed to consume reset token")?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        let row = PasswordResetTokens::find()
            .filter(password_reset_tokens::Column::Token.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to load consumed reset token")?
            .ok_or_else(|| anyhow::anyhow!("Consumed reset token vanished"))?;

        Ok(Some(row.user_id))
    }

    /// Delete tokens that can never be redeemed again. Returns how many rows
    /// were removed.
    pub async fn prune_dead(&self) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = PasswordResetTokens::delete_many()
            .filter(
                sea_orm::Condition::any()
                    .add(password_reset_tokens::Column::Used.eq(true))
                    .add(password_reset_tokens::Column::ExpiresAt.lte(now)),
            )
            .exec(&self.conn)
            .await
            .context("Failed to prune reset tokens")?;

        Ok(result.rows_affected)
    }

    /// Whether any redeemable token exists for the user. Used by tests to
    /// verify the enumeration-safety of reset requests.
    pub async fn has_live_token(&self, user_id: i64) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let count = PasswordResetTokens::find()
            .filter(password_reset_tokens::Column::UserId.eq(user_id))
            .filter(password_reset_tokens::Column::Used.eq(false))
            .filter(password_reset_tokens::Column::ExpiresAt.gt(now))
            .count(&self.conn)
            .await
            .context("Failed to count live reset tokens")?;

        Ok(count > 0)
    }
}
