use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, ApiResponse, AppState};
use crate::services::AuditPage;

#[derive(Deserialize)]
pub struct AuditQuery {
    pub page: Option<u64>,
    pub size: Option<u64>,
}

/// GET /api/audit?page=&size=
/// Most recent entries first; admin only.
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<AuditPage>>, ApiError> {
    let page = state
        .admin()
        .audit_log(
            user.actor(),
            query.page.unwrap_or(1),
            query.size.unwrap_or(20),
        )
        .await?;

    Ok(Json(ApiResponse::success(page)))
}
