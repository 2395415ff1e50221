use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::Role;

pub mod migrator;
pub mod repositories;

pub use repositories::comment::CommentRow;
pub use repositories::ticket::{PatchOutcome, TicketFilter, TicketPatch};
pub use repositories::user::{CreateOutcome, User};

use repositories::attachment::NewAttachment;

/// Marker error for a storage call that exceeded its deadline. Callers map
/// this (and transient connection errors) to a retriable "unavailable"
/// response instead of a plain server error.
#[derive(Debug, thiserror::Error)]
#[error("storage call timed out")]
pub struct StorageTimedOut;

const READ_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

fn is_transient_db_err(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<DbErr>(),
        Some(DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
    )
}

/// Whether an error from the store should surface as `Unavailable` rather
/// than a generic database failure.
#[must_use]
pub fn is_unavailable(err: &anyhow::Error) -> bool {
    err.is::<StorageTimedOut>() || is_transient_db_err(err)
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
    call_timeout: Duration,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1, Duration::from_secs(10)).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
        call_timeout: Duration,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn, call_timeout })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    /// Run a storage call under the configured deadline. No operation is
    /// allowed to block a request indefinitely.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageTimedOut.into()),
        }
    }

    /// Deadline plus bounded retry with backoff for read paths. Only
    /// timeouts and connection-level failures are retried; query errors
    /// surface immediately. Writes go through `bounded` alone so an
    /// ambiguous failure is never re-applied.
    async fn read_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = RETRY_BASE_DELAY;
        let mut last_err = None;

        for attempt in 0..=READ_RETRIES {
            match self.bounded(op()).await {
                Ok(value) => return Ok(value),
                Err(err) if is_unavailable(&err) && attempt < READ_RETRIES => {
                    warn!(attempt, "Transient storage error, retrying: {err}");
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| StorageTimedOut.into()))
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn ticket_repo(&self) -> repositories::ticket::TicketRepository {
        repositories::ticket::TicketRepository::new(self.conn.clone())
    }

    fn comment_repo(&self) -> repositories::comment::CommentRepository {
        repositories::comment::CommentRepository::new(self.conn.clone())
    }

    fn attachment_repo(&self) -> repositories::attachment::AttachmentRepository {
        repositories::attachment::AttachmentRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    fn reset_token_repo(&self) -> repositories::reset_token::ResetTokenRepository {
        repositories::reset_token::ResetTokenRepository::new(self.conn.clone())
    }

    // ========== Users ==========

    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        security: &crate::config::SecurityConfig,
    ) -> Result<CreateOutcome> {
        self.bounded(self.user_repo().create(username, password, security))
            .await
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.read_retry(move || async move { self.user_repo().get(id).await })
            .await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.read_retry(move || async move { self.user_repo().get_by_username(username).await })
            .await
    }

    pub async fn verify_user_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        self.bounded(self.user_repo().verify_password(username, password))
            .await
    }

    pub async fn update_user_password(
        &self,
        user_id: i64,
        new_password: &str,
        security: &crate::config::SecurityConfig,
    ) -> Result<()> {
        self.bounded(
            self.user_repo()
                .update_password(user_id, new_password, security),
        )
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.read_retry(move || async move { self.user_repo().list().await })
            .await
    }

    pub async fn set_user_role(&self, user_id: i64, role: Role) -> Result<Option<User>> {
        self.bounded(self.user_repo().set_role(user_id, role)).await
    }

    // ========== Tickets ==========

    pub async fn create_ticket(
        &self,
        title: &str,
        description: &str,
        priority: crate::domain::TicketPriority,
        user_id: i64,
    ) -> Result<crate::entities::tickets::Model> {
        self.bounded(
            self.ticket_repo()
                .create(title, description, priority, user_id),
        )
        .await
    }

    pub async fn get_ticket(&self, id: i64) -> Result<Option<crate::entities::tickets::Model>> {
        self.read_retry(move || async move { self.ticket_repo().get(id).await })
            .await
    }

    pub async fn list_tickets(
        &self,
        filter: &TicketFilter,
        page: u64,
        size: u64,
    ) -> Result<(Vec<crate::entities::tickets::Model>, u64)> {
        self.read_retry(move || async move { self.ticket_repo().list(filter, page, size).await })
            .await
    }

    pub async fn patch_ticket(
        &self,
        id: i64,
        expected_updated_at: &str,
        patch: TicketPatch,
    ) -> Result<PatchOutcome> {
        self.bounded(self.ticket_repo().patch(id, expected_updated_at, patch))
            .await
    }

    // ========== Comments & attachments ==========

    pub async fn add_comment(
        &self,
        ticket_id: i64,
        author_id: i64,
        content: &str,
    ) -> Result<CommentRow> {
        self.bounded(self.comment_repo().add(ticket_id, author_id, content))
            .await
    }

    pub async fn list_comments(&self, ticket_id: i64) -> Result<Vec<CommentRow>> {
        self.read_retry(move || async move { self.comment_repo().list_for_ticket(ticket_id).await })
            .await
    }

    pub async fn add_attachment(
        &self,
        attachment: NewAttachment,
    ) -> Result<crate::entities::attachments::Model> {
        self.bounded(self.attachment_repo().add(attachment)).await
    }

    pub async fn list_attachments(
        &self,
        ticket_id: i64,
    ) -> Result<Vec<crate::entities::attachments::Model>> {
        self.read_retry(move || async move { self.attachment_repo().list_for_ticket(ticket_id).await })
            .await
    }

    // ========== Audit trail ==========

    pub async fn record_audit(
        &self,
        actor_id: i64,
        action: &str,
        entity: &str,
        entity_id: i64,
        details: &str,
    ) -> Result<()> {
        self.bounded(
            self.audit_repo()
                .record(actor_id, action, entity, entity_id, details),
        )
        .await
    }

    pub async fn list_audit(
        &self,
        page: u64,
        size: u64,
    ) -> Result<(Vec<crate::entities::audit_log::Model>, u64)> {
        self.read_retry(move || async move { self.audit_repo().list(page, size).await })
            .await
    }

    // ========== Password reset tokens ==========

    pub async fn issue_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.bounded(self.reset_token_repo().issue(user_id, token, expires_at))
            .await
    }

    pub async fn consume_reset_token(&self, token: &str) -> Result<Option<i64>> {
        self.bounded(self.reset_token_repo().consume(token)).await
    }

    pub async fn prune_dead_reset_tokens(&self) -> Result<u64> {
        self.bounded(self.reset_token_repo().prune_dead()).await
    }

    pub async fn has_live_reset_token(&self, user_id: i64) -> Result<bool> {
        self.read_retry(move || async move { self.reset_token_repo().has_live_token(user_id).await })
            .await
    }
}
