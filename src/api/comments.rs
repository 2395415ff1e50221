use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, ApiResponse, AppState};
use crate::services::CommentRecord;

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

/// GET /api/tickets/{id}/comments
/// Oldest-first; visible to the ticket owner and staff.
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Path(ticket_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<CommentRecord>>>, ApiError> {
    let comments = state.tickets().comments(user.actor(), ticket_id).await?;
    Ok(Json(ApiResponse::success(comments)))
}

/// POST /api/tickets/{id}/comments
/// Append a comment; comments are immutable once written.
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Path(ticket_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .tickets()
        .add_comment(user.actor(), ticket_id, &payload.content)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(comment))))
}
