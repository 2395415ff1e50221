use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, OkResponse};
use crate::domain::{Actor, Role};
use crate::services::{Account, IssuedReset};

/// Session keys. Only the user id and the login instant are stored; the
/// role is re-read from the database on every request so a role change
/// takes effect immediately.
const SESSION_USER_KEY: &str = "user_id";
const SESSION_ISSUED_AT_KEY: &str = "issued_at";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionUserResponse {
    pub user: Account,
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub username: String,
}

#[derive(Serialize)]
pub struct ResetRequestResponse {
    pub ok: bool,
    /// Present only when the config echoes tokens (dev/test builds); there
    /// is no mail transport in this service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// The identity a request acts as, resolved once per request from the
/// session cookie and injected into request extensions for handlers.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl CurrentUser {
    #[must_use]
    pub const fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

/// Resolve the session into a `CurrentUser` or fail with 401. Sessions are
/// bounded two ways: the store expires them on inactivity, and logins older
/// than the configured absolute lifetime are rejected here even if the
/// record survived.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id: i64 = session
        .get(SESSION_USER_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session load failed: {e}")))?
        .ok_or_else(|| ApiError::unauthenticated("Authentication required"))?;

    let issued_at: i64 = session
        .get(SESSION_ISSUED_AT_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session load failed: {e}")))?
        .unwrap_or(0);

    let ttl_minutes = state.config().read().await.server.session_ttl_minutes;
    if chrono::Utc::now().timestamp() - issued_at > ttl_minutes * 60 {
        let _ = session.flush().await;
        return Err(ApiError::unauthenticated("Session expired"));
    }

    let user = state
        .store()
        .get_user(user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load session user: {e}")))?
        .ok_or_else(|| ApiError::unauthenticated("Authentication required"))?;

    tracing::Span::current().record("user_id", user.id);

    request.extensions_mut().insert(CurrentUser {
        id: user.id,
        username: user.username,
        role: user.role,
    });

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/register
/// Create an account. Does not log the new user in.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth().register(&payload.username, &payload.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OkResponse::OK)),
    ))
}

/// POST /api/login
/// Verify credentials and bind a fresh session to the account.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<SessionUserResponse>>, ApiError> {
    let account = state.auth().login(&payload.username, &payload.password).await?;

    // Rotate the session id at the privilege boundary so a pre-login cookie
    // can never be promoted into an authenticated one.
    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to rotate session: {e}")))?;
    session
        .insert(SESSION_USER_KEY, account.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;
    session
        .insert(SESSION_ISSUED_AT_KEY, chrono::Utc::now().timestamp())
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    Ok(Json(ApiResponse::success(SessionUserResponse {
        user: account,
    })))
}

/// POST /api/logout
/// Drop the session. Safe to call without one.
pub async fn logout(session: Session) -> Json<ApiResponse<OkResponse>> {
    let _ = session.flush().await;
    Json(ApiResponse::success(OkResponse::OK))
}

/// GET /api/me
/// The identity behind the current session.
pub async fn me(
    axum::Extension(user): axum::Extension<CurrentUser>,
) -> Json<ApiResponse<SessionUserResponse>> {
    Json(ApiResponse::success(SessionUserResponse {
        user: Account {
            id: user.id,
            username: user.username,
            role: user.role,
        },
    }))
}

/// POST /api/password/request
/// Issue a reset token. The response is shaped identically whether or not
/// the username exists.
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<ApiResponse<ResetRequestResponse>>, ApiError> {
    let issued = state.auth().request_password_reset(&payload.username).await?;

    let echo = state.config().read().await.security.expose_reset_tokens;
    let token = match issued {
        IssuedReset::Issued(token) if echo => Some(token),
        IssuedReset::Issued(_) | IssuedReset::NoAccount => None,
    };

    Ok(Json(ApiResponse::success(ResetRequestResponse {
        ok: true,
        token,
    })))
}

/// POST /api/password/reset
/// Redeem a reset token. A token works at most once.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<OkResponse>>, ApiError> {
    state
        .auth()
        .redeem_password_reset(&payload.token, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(OkResponse::OK)))
}
