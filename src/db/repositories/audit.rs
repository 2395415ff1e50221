use anyhow::{Context, Result};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set};

use crate::entities::{audit_log, prelude::*};

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Append one entry. Insert-only; there is no update or delete path
    /// through this repository.
    pub async fn record(
        &self,
        actor_id: i64,
        action: &str,
        entity: &str,
        entity_id: i64,
        details: &str,
    ) -> Result<()> {
        let active = audit_log::ActiveModel {
            ts: Set(chrono::Utc::now().to_rfc3339()),
            actor_id: Set(actor_id),
            action: Set(action.to_string()),
            entity: Set(entity.to_string()),
            entity_id: Set(entity_id),
            details: Set(details.to_string()),
            ..Default::default()
        };

        AuditLog::insert(active)
            .exec(&self.conn)
            .await
            .context("Failed to append audit entry")?;
        Ok(())
    }

    /// Most recent entries first, with the total count for pagination.
    pub async fn list(&self, page: u64, size: u64) -> Result<(Vec<audit_log::Model>, u64)> {
        let paginator = AuditLog::find()
            .order_by_desc(audit_log::Column::Id)
            .paginate(&self.conn, size);

        let total = paginator
            .num_items()
            .await
            .context("Failed to count audit entries")?;
        let items = paginator
            .fetch_page(page - 1)
            .await
            .context("Failed to fetch audit page")?;

        Ok((items, total))
    }
}
