use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::domain::{TicketPriority, TicketStatus};
use crate::entities::{prelude::*, tickets};

pub struct TicketRepository {
    conn: DatabaseConnection,
}

/// Filters for the paginated listing. `owner` scopes non-staff callers to
/// their own tickets.
#[derive(Debug, Default, Clone)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub owner: Option<i64>,
}

/// Partial update applied under a compare-and-swap on `updated_at`.
#[derive(Debug, Default, Clone)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<i64>,
}

impl TicketPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
    }
}

/// Result of a conditional patch.
pub enum PatchOutcome {
    Applied(tickets::Model),
    /// The row exists but `updated_at` moved underneath us; a concurrent
    /// writer won the race.
    Stale,
    Missing,
}

impl TicketRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        title: &str,
        description: &str,
        priority: TicketPriority,
        user_id: i64,
    ) -> Result<tickets::Model> {
        let now = chrono::Utc::now().to_rfc3339();
        let active = tickets::ActiveModel {
            title: Set(title.to_string()),
            description: Set(description.to_string()),
            status: Set(TicketStatus::Open.as_str().to_string()),
            priority: Set(priority.as_str().to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            assigned_to: Set(None),
            user_id: Set(user_id),
            ..Default::default()
        };

        active.insert(&self.conn).await.context("Failed to insert ticket")
    }

    pub async fn get(&self, id: i64) -> Result<Option<tickets::Model>> {
        Tickets::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query ticket")
    }

    /// Page of tickets newest-first, plus the total row count for the same
    /// filter so callers can render pagination.
    pub async fn list(
        &self,
        filter: &TicketFilter,
        page: u64,
        size: u64,
    ) -> Result<(Vec<tickets::Model>, u64)> {
        let mut query = Tickets::find()
            .order_by_desc(tickets::Column::CreatedAt)
            .order_by_desc(tickets::Column::Id);

        if let Some(status) = filter.status {
            query = query.filter(tickets::Column::Status.eq(status.as_str()));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(tickets::Column::Priority.eq(priority.as_str()));
        }
        if let Some(owner) = filter.owner {
            query = query.filter(tickets::Column::UserId.eq(owner));
        }

        let paginator = query.paginate(&self.conn, size);
        let total = paginator
            .num_items()
            .await
            .context("Failed to count tickets")?;
        let items = paginator
            .fetch_page(page - 1)
            .await
            .context("Failed to fetch ticket page")?;

        Ok((items, total))
    }

    /// Apply a partial update only if the row still carries
    /// `expected_updated_at`. Two concurrent writers to the same ticket
    /// serialize here: the loser's UPDATE matches zero rows.
    pub async fn patch(
        &self,
        id: i64,
        expected_updated_at: &str,
        patch: TicketPatch,
    ) -> Result<PatchOutcome> {
        let mut update = Tickets::update_many()
            .filter(tickets::Column::Id.eq(id))
            .filter(tickets::Column::UpdatedAt.eq(expected_updated_at));

        if let Some(title) = patch.title {
            update = update.col_expr(tickets::Column::Title, Expr::value(title));
        }
        if let Some(description) = patch.description {
            update = update.col_expr(tickets::Column::Description, Expr::value(description));
        }
        if let Some(status) = patch.status {
            update = update.col_expr(tickets::Column::Status, Expr::value(status.as_str()));
        }
        if let Some(priority) = patch.priority {
            update = update.col_expr(tickets::Column::Priority, Expr::value(priority.as_str()));
        }
        if let Some(assignee) = patch.assigned_to {
            update = update.col_expr(tickets::Column::AssignedTo, Expr::value(assignee));
        }

        let now = chrono::Utc::now().to_rfc3339();
        update = update.col_expr(tickets::Column::UpdatedAt, Expr::value(now));

        let result = update
            .exec(&self.conn)
            .await
            .context("Failed to update ticket")?;

        if result.rows_affected == 0 {
            let exists = Tickets::find_by_id(id)
                .one(&self.conn)
                .await
                .context("Failed to re-check ticket after stale update")?
                .is_some();
            return Ok(if exists {
                PatchOutcome::Stale
            } else {
                PatchOutcome::Missing
            });
        }

        let updated = Tickets::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to reload ticket after update")?
            .ok_or_else(|| anyhow::anyhow!("Ticket {id} vanished after update"))?;

        Ok(PatchOutcome::Applied(updated))
    }
}
