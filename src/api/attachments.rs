use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, ApiResponse, AppState};
use crate::services::AttachmentRecord;

/// GET /api/tickets/{id}/attachments
/// Oldest-first metadata; the bytes are served under /uploads.
pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Path(ticket_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<AttachmentRecord>>>, ApiError> {
    let attachments = state.tickets().attachments(user.actor(), ticket_id).await?;
    Ok(Json(ApiResponse::success(attachments)))
}

/// POST /api/tickets/{id}/attachments
/// Multipart upload; expects a single `file` field.
pub async fn upload_attachment(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Path(ticket_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("Failed to read upload: {e}")))?;

        let attachment = state
            .tickets()
            .add_attachment(user.actor(), ticket_id, &filename, &bytes)
            .await?;

        return Ok((StatusCode::CREATED, Json(ApiResponse::success(attachment))));
    }

    Err(ApiError::validation("Multipart field 'file' is required"))
}
