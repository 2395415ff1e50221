use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{comments, prelude::*, users};

/// A comment joined with its author's username for display.
#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: i64,
    pub ticket_id: i64,
    pub author_id: i64,
    pub author: String,
    pub content: String,
    pub created_at: String,
}

fn map_row(comment: comments::Model, author: Option<users::Model>) -> CommentRow {
    CommentRow {
        id: comment.id,
        ticket_id: comment.ticket_id,
        author_id: comment.author_id,
        author: author.map(|u| u.username).unwrap_or_default(),
        content: comment.content,
        created_at: comment.created_at,
    }
}

pub struct CommentRepository {
    conn: DatabaseConnection,
}

impl CommentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add(&self, ticket_id: i64, author_id: i64, content: &str) -> Result<CommentRow> {
        let active = comments::ActiveModel {
            ticket_id: Set(ticket_id),
            author_id: Set(author_id),
            content: Set(content.to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert comment")?;

        let author = Users::find_by_id(model.author_id)
            .one(&self.conn)
            .await
            .context("Failed to load comment author")?;

        Ok(map_row(model, author))
    }

    /// Comments for a ticket in the order they were written.
    pub async fn list_for_ticket(&self, ticket_id: i64) -> Result<Vec<CommentRow>> {
        let rows = Comments::find()
            .filter(comments::Column::TicketId.eq(ticket_id))
            .order_by_asc(comments::Column::Id)
            .find_also_related(Users)
            .all(&self.conn)
            .await
            .context("Failed to list comments")?;

        Ok(rows
            .into_iter()
            .map(|(comment, author)| map_row(comment, author))
            .collect())
    }
}
