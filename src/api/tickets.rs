use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, ApiResponse, AppState};
use crate::domain::{TicketPriority, TicketStatus};
use crate::services::{NewTicket, TicketPage, TicketRecord, TicketUpdate};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

#[derive(Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    /// Defaults to Normal when omitted.
    pub priority: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub user_id: i64,
}

fn parse_status(value: &str) -> Result<TicketStatus, ApiError> {
    value
        .parse()
        .map_err(|e: crate::domain::ticket::UnknownStatus| ApiError::validation(e.to_string()))
}

fn parse_priority(value: &str) -> Result<TicketPriority, ApiError> {
    value
        .parse()
        .map_err(|e: crate::domain::ticket::UnknownPriority| ApiError::validation(e.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/tickets?status=&priority=&page=&size=
/// Newest-first page; non-staff callers only see their own tickets.
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<ApiResponse<TicketPage>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(parse_status)
        .transpose()?;
    let priority = query
        .priority
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(parse_priority)
        .transpose()?;

    let page = state
        .tickets()
        .list(
            user.actor(),
            status,
            priority,
            query.page.unwrap_or(1),
            query.size.unwrap_or(20),
        )
        .await?;

    Ok(Json(ApiResponse::success(page)))
}

/// POST /api/tickets
/// File a new ticket owned by the caller.
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Json(payload): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let priority = match payload.priority.as_deref() {
        None | Some("") => TicketPriority::Normal,
        Some(value) => parse_priority(value)?,
    };

    let ticket = state
        .tickets()
        .create(
            user.actor(),
            NewTicket {
                title: payload.title,
                description: payload.description,
                priority,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(ticket))))
}

/// GET /api/tickets/{id}
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<TicketRecord>>, ApiError> {
    let ticket = state.tickets().get(user.actor(), id).await?;
    Ok(Json(ApiResponse::success(ticket)))
}

/// PUT /api/tickets/{id}
/// Partial update under the workflow rules; returns the canonical
/// post-mutation ticket.
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTicketRequest>,
) -> Result<Json<ApiResponse<TicketRecord>>, ApiError> {
    let update = TicketUpdate {
        title: payload.title,
        description: payload.description,
        status: payload.status.as_deref().map(parse_status).transpose()?,
        priority: payload.priority.as_deref().map(parse_priority).transpose()?,
    };

    let ticket = state
        .tickets()
        .update_fields(user.actor(), id, update)
        .await?;

    Ok(Json(ApiResponse::success(ticket)))
}

/// PUT /api/tickets/{id}/assign
/// Staff only; the assignee must also be staff.
pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<ApiResponse<TicketRecord>>, ApiError> {
    let ticket = state
        .tickets()
        .assign(user.actor(), id, payload.user_id)
        .await?;

    Ok(Json(ApiResponse::success(ticket)))
}

/// PUT /api/tickets/{id}/close
/// Staff only; closing a closed ticket is a no-op.
pub async fn close_ticket(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<TicketRecord>>, ApiError> {
    let ticket = state.tickets().close(user.actor(), id).await?;
    Ok(Json(ApiResponse::success(ticket)))
}
