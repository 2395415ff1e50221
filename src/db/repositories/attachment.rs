use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{attachments, prelude::*};

pub struct AttachmentRepository {
    conn: DatabaseConnection,
}

/// Metadata for a stored blob; the bytes themselves already live under the
/// upload root by the time this row is written.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub ticket_id: i64,
    pub filename: String,
    pub stored_path: String,
    pub mime: String,
    pub size: i64,
    pub uploader_id: i64,
}

impl AttachmentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add(&self, attachment: NewAttachment) -> Result<attachments::Model> {
        let active = attachments::ActiveModel {
            ticket_id: Set(attachment.ticket_id),
            filename: Set(attachment.filename),
            stored_path: Set(attachment.stored_path),
            mime: Set(attachment.mime),
            size: Set(attachment.size),
            uploaded_at: Set(chrono::Utc::now().to_rfc3339()),
            uploader_id: Set(attachment.uploader_id),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert attachment")
    }

    /// Attachments for a ticket in upload order.
    pub async fn list_for_ticket(&self, ticket_id: i64) -> Result<Vec<attachments::Model>> {
        Attachments::find()
            .filter(attachments::Column::TicketId.eq(ticket_id))
            .order_by_asc(attachments::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list attachments")
    }
}
