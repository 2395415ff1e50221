//! Domain service for staff-facing administration: the user directory, role
//! changes, and audit trail readback.

use serde::Serialize;
use thiserror::Error;

use crate::domain::Role;
use crate::services::auth_service::Account;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("User not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Storage unavailable")]
    Unavailable,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Audit trail write failed")]
    AuditFailed,
}

impl From<anyhow::Error> for AdminError {
    fn from(err: anyhow::Error) -> Self {
        if crate::db::is_unavailable(&err) {
            Self::Unavailable
        } else {
            Self::Database(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub items: Vec<crate::entities::audit_log::Model>,
    pub page: u64,
    pub size: u64,
    pub total: u64,
}

/// Domain service trait for administration.
#[async_trait::async_trait]
pub trait AdminService: Send + Sync {
    /// Full user directory, staff only.
    async fn list_users(&self, actor: crate::domain::Actor) -> Result<Vec<Account>, AdminError>;

    /// Change a user's role, admin only. Returns the updated account and
    /// records one audit entry.
    async fn set_role(
        &self,
        actor: crate::domain::Actor,
        user_id: i64,
        role: Role,
    ) -> Result<Account, AdminError>;

    /// Paginated audit readback, most recent first, admin only.
    async fn audit_log(
        &self,
        actor: crate::domain::Actor,
        page: u64,
        size: u64,
    ) -> Result<AuditPage, AdminError>;
}
