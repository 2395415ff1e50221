//! Domain service for the ticket lifecycle: creation, listing, the status
//! state machine, assignment, closure, and the per-ticket comment and
//! attachment threads.

use serde::Serialize;
use thiserror::Error;

use crate::domain::{Actor, SlaState, TicketPriority, TicketStatus};

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Illegal status transition: {from} -> {to}")]
    InvalidTransition {
        from: TicketStatus,
        to: TicketStatus,
    },

    #[error("User {0} cannot be assigned tickets")]
    InvalidAssignee(i64),

    #[error("Ticket was modified concurrently")]
    Conflict,

    #[error("File exceeds the {limit} byte upload limit")]
    PayloadTooLarge { limit: usize },

    #[error("Storage unavailable")]
    Unavailable,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Audit trail write failed")]
    AuditFailed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for TicketError {
    fn from(err: anyhow::Error) -> Self {
        if crate::db::is_unavailable(&err) {
            Self::Unavailable
        } else {
            Self::Database(err.to_string())
        }
    }
}

/// A ticket as callers see it. `sla` is derived from the current wall clock
/// on every read and is never stored.
#[derive(Debug, Clone, Serialize)]
pub struct TicketRecord {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_at: String,
    pub updated_at: String,
    pub assigned_to: Option<i64>,
    pub user_id: i64,
    pub sla: SlaState,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketPage {
    pub items: Vec<TicketRecord>,
    pub page: u64,
    pub size: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentRecord {
    pub id: i64,
    pub ticket_id: i64,
    pub author_id: i64,
    pub author: String,
    pub content: String,
    pub created_at: String,
}

impl From<crate::db::CommentRow> for CommentRecord {
    fn from(row: crate::db::CommentRow) -> Self {
        Self {
            id: row.id,
            ticket_id: row.ticket_id,
            author_id: row.author_id,
            author: row.author,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentRecord {
    pub id: i64,
    pub ticket_id: i64,
    pub filename: String,
    pub path: String,
    pub mime: String,
    pub size: i64,
    pub uploaded_at: String,
    pub uploader_id: i64,
}

impl From<crate::entities::attachments::Model> for AttachmentRecord {
    fn from(model: crate::entities::attachments::Model) -> Self {
        Self {
            id: model.id,
            ticket_id: model.ticket_id,
            filename: model.filename,
            path: model.stored_path,
            mime: model.mime,
            size: model.size,
            uploaded_at: model.uploaded_at,
            uploader_id: model.uploader_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Default, Clone)]
pub struct TicketUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
}

/// Domain service trait for the ticket workflow. Every method takes the
/// acting identity explicitly; nothing here reads ambient session state.
#[async_trait::async_trait]
pub trait TicketService: Send + Sync {
    /// File a new ticket owned by the actor. Status starts at Open,
    /// unassigned.
    async fn create(&self, actor: Actor, ticket: NewTicket) -> Result<TicketRecord, TicketError>;

    async fn get(&self, actor: Actor, id: i64) -> Result<TicketRecord, TicketError>;

    /// Newest-first page. Non-staff actors only ever see their own tickets.
    async fn list(
        &self,
        actor: Actor,
        status: Option<TicketStatus>,
        priority: Option<TicketPriority>,
        page: u64,
        size: u64,
    ) -> Result<TicketPage, TicketError>;

    /// Partial field update under the state-machine rules. Emits one audit
    /// entry naming the changed fields; an empty effective change emits
    /// none.
    async fn update_fields(
        &self,
        actor: Actor,
        id: i64,
        update: TicketUpdate,
    ) -> Result<TicketRecord, TicketError>;

    /// Hand a ticket to a staff member.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::InvalidAssignee`] when the target user is
    /// missing or not staff.
    async fn assign(
        &self,
        actor: Actor,
        id: i64,
        assignee_id: i64,
    ) -> Result<TicketRecord, TicketError>;

    /// Close a ticket. Closing an already-Closed ticket is a no-op that
    /// returns the current state and writes no audit entry.
    async fn close(&self, actor: Actor, id: i64) -> Result<TicketRecord, TicketError>;

    async fn add_comment(
        &self,
        actor: Actor,
        ticket_id: i64,
        content: &str,
    ) -> Result<CommentRecord, TicketError>;

    async fn comments(&self, actor: Actor, ticket_id: i64)
    -> Result<Vec<CommentRecord>, TicketError>;

    async fn add_attachment(
        &self,
        actor: Actor,
        ticket_id: i64,
        filename: &str,
        bytes: &[u8],
    ) -> Result<AttachmentRecord, TicketError>;

    async fn attachments(
        &self,
        actor: Actor,
        ticket_id: i64,
    ) -> Result<Vec<AttachmentRecord>, TicketError>;
}
