use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, ApiResponse, AppState};
use crate::domain::Role;
use crate::services::Account;

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

/// GET /api/users
/// Full directory; staff only (enforced by the admin service policy).
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<Account>>>, ApiError> {
    let users = state.admin().list_users(user.actor()).await?;
    Ok(Json(ApiResponse::success(users)))
}

/// PUT /api/users/{id}/role
/// Admin only; records one audit entry per change.
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Path(user_id): Path<i64>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let role: Role = payload
        .role
        .parse()
        .map_err(|e: crate::domain::role::UnknownRole| ApiError::validation(e.to_string()))?;

    let updated = state.admin().set_role(user.actor(), user_id, role).await?;
    Ok(Json(ApiResponse::success(updated)))
}
