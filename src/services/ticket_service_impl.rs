//! `SeaORM` implementation of the `TicketService` trait.
//!
//! Order of operations on every mutating path: authorization, then
//! validation, then the storage write, then the audit entry. Policy denials
//! and validation failures happen before anything is written, so a rejected
//! request never leaves a trace.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::db::repositories::attachment::NewAttachment;
use crate::db::{PatchOutcome, Store, TicketFilter, TicketPatch};
use crate::domain::{self, Action, Actor, TicketPriority, TicketStatus, policy, sla};
use crate::entities::tickets;
use crate::services::audit::record_with_retry;
use crate::services::clamp_paging;
use crate::services::ticket_service::{
    AttachmentRecord, CommentRecord, NewTicket, TicketError, TicketPage, TicketRecord,
    TicketService, TicketUpdate,
};
use crate::storage::{AttachmentStore, file_extension};

const MAX_TITLE_LEN: usize = 160;
const MAX_DESCRIPTION_LEN: usize = 10_000;

pub struct SeaOrmTicketService {
    store: Store,
    blobs: AttachmentStore,
    config: Arc<RwLock<Config>>,
}

impl SeaOrmTicketService {
    #[must_use]
    pub const fn new(store: Store, blobs: AttachmentStore, config: Arc<RwLock<Config>>) -> Self {
        Self { store, blobs, config }
    }

    fn to_record(model: tickets::Model) -> Result<TicketRecord, TicketError> {
        let status = model
            .status
            .parse::<TicketStatus>()
            .map_err(|e| TicketError::Internal(e.to_string()))?;
        let priority = model
            .priority
            .parse::<TicketPriority>()
            .map_err(|e| TicketError::Internal(e.to_string()))?;
        let sla = sla::evaluate_str(priority, &model.created_at, Utc::now());

        Ok(TicketRecord {
            id: model.id,
            title: model.title,
            description: model.description,
            status,
            priority,
            created_at: model.created_at,
            updated_at: model.updated_at,
            assigned_to: model.assigned_to,
            user_id: model.user_id,
            sla,
        })
    }

    async fn load(&self, id: i64) -> Result<tickets::Model, TicketError> {
        self.store
            .get_ticket(id)
            .await?
            .ok_or(TicketError::NotFound)
    }

    fn require(actor: Actor, action: Action, owner: Option<i64>) -> Result<(), TicketError> {
        if policy::allows(actor, action, owner) {
            Ok(())
        } else {
            Err(TicketError::Forbidden)
        }
    }

    fn validate_title(title: &str) -> Result<(), TicketError> {
        if title.is_empty() {
            return Err(TicketError::Validation("Title is required".to_string()));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(TicketError::Validation(format!(
                "Title must be {MAX_TITLE_LEN} characters or less"
            )));
        }
        Ok(())
    }

    fn validate_description(description: &str) -> Result<(), TicketError> {
        if description.is_empty() {
            return Err(TicketError::Validation(
                "Description is required".to_string(),
            ));
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(TicketError::Validation(format!(
                "Description must be {MAX_DESCRIPTION_LEN} characters or less"
            )));
        }
        Ok(())
    }

    async fn audit(
        &self,
        actor: Actor,
        action: &str,
        ticket_id: i64,
        details: &str,
    ) -> Result<(), TicketError> {
        record_with_retry(&self.store, actor.id, action, "ticket", ticket_id, details)
            .await
            .map_err(|_| TicketError::AuditFailed)
    }

    /// Apply a compare-and-swap patch, mapping the race-loss and vanished
    /// cases onto the error taxonomy.
    async fn apply_patch(
        &self,
        id: i64,
        expected_updated_at: &str,
        patch: TicketPatch,
    ) -> Result<tickets::Model, TicketError> {
        match self.store.patch_ticket(id, expected_updated_at, patch).await? {
            PatchOutcome::Applied(model) => Ok(model),
            PatchOutcome::Stale => Err(TicketError::Conflict),
            PatchOutcome::Missing => Err(TicketError::NotFound),
        }
    }
}

#[async_trait]
impl TicketService for SeaOrmTicketService {
    async fn create(&self, actor: Actor, ticket: NewTicket) -> Result<TicketRecord, TicketError> {
        Self::require(actor, Action::CreateTicket, None)?;

        let title = ticket.title.trim();
        let description = ticket.description.trim();
        Self::validate_title(title)?;
        Self::validate_description(description)?;
        if !ticket.priority.creatable() {
            return Err(TicketError::Validation(format!(
                "Priority {} cannot be set at creation",
                ticket.priority
            )));
        }

        let model = self
            .store
            .create_ticket(title, description, ticket.priority, actor.id)
            .await?;
        let id = model.id;

        info!(ticket_id = id, user_id = actor.id, "Ticket created");
        self.audit(actor, "create", id, &format!("title={title}"))
            .await?;

        Self::to_record(model)
    }

    async fn get(&self, actor: Actor, id: i64) -> Result<TicketRecord, TicketError> {
        let model = self.load(id).await?;
        Self::require(actor, Action::ViewTicket, Some(model.user_id))?;
        Self::to_record(model)
    }

    async fn list(
        &self,
        actor: Actor,
        status: Option<TicketStatus>,
        priority: Option<TicketPriority>,
        page: u64,
        size: u64,
    ) -> Result<TicketPage, TicketError> {
        let (page, size) = clamp_paging(page, size);

        let filter = TicketFilter {
            status,
            priority,
            owner: (!actor.is_staff()).then_some(actor.id),
        };

        let (models, total) = self.store.list_tickets(&filter, page, size).await?;
        let items = models
            .into_iter()
            .map(Self::to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TicketPage {
            items,
            page,
            size,
            total,
        })
    }

    async fn update_fields(
        &self,
        actor: Actor,
        id: i64,
        update: TicketUpdate,
    ) -> Result<TicketRecord, TicketError> {
        let model = self.load(id).await?;
        let owner = Some(model.user_id);
        let staff = actor.is_staff();

        let current_status = model
            .status
            .parse::<TicketStatus>()
            .map_err(|e| TicketError::Internal(e.to_string()))?;
        let current_priority = model
            .priority
            .parse::<TicketPriority>()
            .map_err(|e| TicketError::Internal(e.to_string()))?;

        let mut patch = TicketPatch::default();
        let mut changed: Vec<String> = Vec::new();

        if let Some(title) = update.title {
            Self::require(actor, Action::EditTicketBody, owner)?;
            let title = title.trim().to_string();
            Self::validate_title(&title)?;
            if title != model.title {
                changed.push("title".to_string());
                patch.title = Some(title);
            }
        }

        if let Some(description) = update.description {
            Self::require(actor, Action::EditTicketBody, owner)?;
            let description = description.trim().to_string();
            Self::validate_description(&description)?;
            if description != model.description {
                changed.push("description".to_string());
                patch.description = Some(description);
            }
        }

        if let Some(priority) = update.priority {
            Self::require(actor, Action::EditTicketPriority, owner)?;
            if priority != current_priority {
                changed.push(format!("priority: {current_priority} -> {priority}"));
                patch.priority = Some(priority);
            }
        }

        if let Some(status) = update.status {
            Self::require(actor, Action::EditTicketStatus, owner)?;
            if status != current_status {
                // Plain users may only shuffle their own unassigned ticket
                // between the working states; everything else is staff
                // territory.
                if !staff && model.assigned_to.is_some() {
                    return Err(TicketError::Forbidden);
                }
                if !domain::ticket::transition_allowed(current_status, status, staff) {
                    return Err(TicketError::InvalidTransition {
                        from: current_status,
                        to: status,
                    });
                }
                changed.push(format!("status: {current_status} -> {status}"));
                patch.status = Some(status);
            }
        }

        if patch.is_empty() {
            // Nothing effectively changed; nothing to write or record.
            return Self::to_record(model);
        }

        let updated = self.apply_patch(id, &model.updated_at, patch).await?;

        let details = changed.join("; ");
        info!(ticket_id = id, user_id = actor.id, "Ticket updated: {details}");
        self.audit(actor, "update", id, &details).await?;

        Self::to_record(updated)
    }

    async fn assign(
        &self,
        actor: Actor,
        id: i64,
        assignee_id: i64,
    ) -> Result<TicketRecord, TicketError> {
        Self::require(actor, Action::AssignTicket, None)?;

        let model = self.load(id).await?;

        let assignee = self
            .store
            .get_user(assignee_id)
            .await?
            .ok_or(TicketError::InvalidAssignee(assignee_id))?;
        if !assignee.role.is_staff() {
            return Err(TicketError::InvalidAssignee(assignee_id));
        }

        let patch = TicketPatch {
            assigned_to: Some(assignee_id),
            ..Default::default()
        };
        let updated = self.apply_patch(id, &model.updated_at, patch).await?;

        info!(ticket_id = id, assignee_id, user_id = actor.id, "Ticket assigned");
        self.audit(actor, "assign", id, &format!("to={assignee_id}"))
            .await?;

        Self::to_record(updated)
    }

    async fn close(&self, actor: Actor, id: i64) -> Result<TicketRecord, TicketError> {
        Self::require(actor, Action::CloseTicket, None)?;

        let model = self.load(id).await?;
        if model.status == TicketStatus::Closed.as_str() {
            // Already terminal; idempotent no-op with no second audit entry.
            return Self::to_record(model);
        }

        let patch = TicketPatch {
            status: Some(TicketStatus::Closed),
            ..Default::default()
        };
        let updated = self.apply_patch(id, &model.updated_at, patch).await?;

        info!(ticket_id = id, user_id = actor.id, "Ticket closed");
        self.audit(actor, "close", id, "").await?;

        Self::to_record(updated)
    }

    async fn add_comment(
        &self,
        actor: Actor,
        ticket_id: i64,
        content: &str,
    ) -> Result<CommentRecord, TicketError> {
        let model = self.load(ticket_id).await?;
        Self::require(actor, Action::CommentOnTicket, Some(model.user_id))?;

        let content = content.trim();
        if content.is_empty() {
            return Err(TicketError::Validation(
                "Comment content cannot be empty".to_string(),
            ));
        }

        let row = self.store.add_comment(ticket_id, actor.id, content).await?;
        Ok(row.into())
    }

    async fn comments(
        &self,
        actor: Actor,
        ticket_id: i64,
    ) -> Result<Vec<CommentRecord>, TicketError> {
        let model = self.load(ticket_id).await?;
        Self::require(actor, Action::ViewTicket, Some(model.user_id))?;

        let rows = self.store.list_comments(ticket_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add_attachment(
        &self,
        actor: Actor,
        ticket_id: i64,
        filename: &str,
        bytes: &[u8],
    ) -> Result<AttachmentRecord, TicketError> {
        let model = self.load(ticket_id).await?;
        Self::require(actor, Action::AttachToTicket, Some(model.user_id))?;

        if filename.is_empty() {
            return Err(TicketError::Validation("Filename is required".to_string()));
        }

        let uploads = self.config.read().await.uploads.clone();

        let allowed = file_extension(filename)
            .is_some_and(|ext| uploads.allowed_extensions.iter().any(|a| *a == ext));
        if !allowed {
            return Err(TicketError::Validation(format!(
                "File type not allowed; accepted extensions: {}",
                uploads.allowed_extensions.join(", ")
            )));
        }

        if bytes.len() > uploads.max_upload_bytes {
            return Err(TicketError::PayloadTooLarge {
                limit: uploads.max_upload_bytes,
            });
        }

        let blob = self
            .blobs
            .save(filename, bytes)
            .await
            .map_err(|e| TicketError::Internal(format!("Failed to store attachment: {e}")))?;

        let stored = self
            .store
            .add_attachment(NewAttachment {
                ticket_id,
                filename: crate::storage::sanitize_filename(filename),
                stored_path: blob.stored_name,
                mime: blob.mime,
                size: blob.size,
                uploader_id: actor.id,
            })
            .await?;

        info!(ticket_id, user_id = actor.id, "Attachment uploaded: {}", stored.filename);
        self.audit(actor, "attach", ticket_id, &stored.filename)
            .await?;

        Ok(stored.into())
    }

    async fn attachments(
        &self,
        actor: Actor,
        ticket_id: i64,
    ) -> Result<Vec<AttachmentRecord>, TicketError> {
        let model = self.load(ticket_id).await?;
        Self::require(actor, Action::ViewTicket, Some(model.user_id))?;

        let rows = self.store.list_attachments(ticket_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
