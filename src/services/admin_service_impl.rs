//! `SeaORM` implementation of the `AdminService` trait.

use async_trait::async_trait;
use tracing::info;

use crate::db::Store;
use crate::domain::{Action, Actor, Role, policy};
use crate::services::admin_service::{AdminError, AdminService, AuditPage};
use crate::services::audit::record_with_retry;
use crate::services::auth_service::Account;
use crate::services::clamp_paging;

pub struct SeaOrmAdminService {
    store: Store,
}

impl SeaOrmAdminService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AdminService for SeaOrmAdminService {
    async fn list_users(&self, actor: Actor) -> Result<Vec<Account>, AdminError> {
        if !policy::allows(actor, Action::ListUsers, None) {
            return Err(AdminError::Forbidden);
        }

        let users = self.store.list_users().await?;
        Ok(users.into_iter().map(Account::from).collect())
    }

    async fn set_role(
        &self,
        actor: Actor,
        user_id: i64,
        role: Role,
    ) -> Result<Account, AdminError> {
        if !policy::allows(actor, Action::ChangeRole, None) {
            return Err(AdminError::Forbidden);
        }

        let updated = self
            .store
            .set_user_role(user_id, role)
            .await?
            .ok_or(AdminError::NotFound)?;

        info!(user_id, role = %role, actor_id = actor.id, "Role changed");
        record_with_retry(&self.store, actor.id, "set_role", "user", user_id, role.as_str())
            .await
            .map_err(|_| AdminError::AuditFailed)?;

        Ok(updated.into())
    }

    async fn audit_log(&self, actor: Actor, page: u64, size: u64) -> Result<AuditPage, AdminError> {
        if !policy::allows(actor, Action::ViewAudit, None) {
            return Err(AdminError::Forbidden);
        }

        let (page, size) = clamp_paging(page, size);
        let (items, total) = self.store.list_audit(page, size).await?;

        Ok(AuditPage {
            items,
            page,
            size,
            total,
        })
    }
}
