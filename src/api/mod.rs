use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, ExpiredDeletion, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;

use crate::config::Config;
use crate::services::{
    AdminService, AuthService, SeaOrmAdminService, SeaOrmAuthService, SeaOrmTicketService,
    TicketService,
};
use crate::state::SharedState;
use crate::storage::AttachmentStore;

mod attachments;
mod audit;
pub mod auth;
mod comments;
mod error;
mod observability;
mod system;
mod tickets;
mod types;
mod users;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    auth: Arc<dyn AuthService>,

    tickets: Arc<dyn TicketService>,

    admin: Arc<dyn AdminService>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.auth
    }

    #[must_use]
    pub fn tickets(&self) -> &Arc<dyn TicketService> {
        &self.tickets
    }

    #[must_use]
    pub fn admin(&self) -> &Arc<dyn AdminService> {
        &self.admin
    }
}

pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    let store = shared.store.clone();
    let config = shared.config.clone();
    let blobs = AttachmentStore::new(shared.upload_path.clone());

    let auth: Arc<dyn AuthService> =
        Arc::new(SeaOrmAuthService::new(store.clone(), config.clone()));
    let tickets: Arc<dyn TicketService> =
        Arc::new(SeaOrmTicketService::new(store.clone(), blobs, config));
    let admin: Arc<dyn AdminService> = Arc::new(SeaOrmAdminService::new(store));

    Arc::new(AppState {
        shared,
        auth,
        tickets,
        admin,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub async fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let (upload_path, cors_origins, secure_cookies, session_ttl_minutes, max_upload_bytes) = {
        let config = state.config().read().await;
        (
            config.uploads.upload_path.clone(),
            config.server.cors_allowed_origins.clone(),
            config.server.secure_cookies,
            config.server.session_ttl_minutes,
            config.uploads.max_upload_bytes,
        )
    };

    // Sessions live in the same SQLite file as everything else.
    let session_store = SqliteStore::new(state.store().conn.get_sqlite_connection_pool().clone());
    session_store
        .migrate()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to migrate session store: {e}"))?;

    tokio::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(600)),
    );

    let session_layer = SessionManagerLayer::new(session_store)
        .with_name("deskd_session")
        .with_secure(secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            session_ttl_minutes,
        )));

    let protected_routes = create_protected_router(state.clone(), max_upload_bytes);

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/password/request", post(auth::request_password_reset))
        .route("/password/reset", post(auth::reset_password))
        .route("/health", get(system::health))
        .layer(session_layer)
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Ok(Router::new()
        .nest("/api", api_router)
        .nest_service(
            "/uploads",
            tower_http::services::ServeDir::new(upload_path),
        )
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::request_tracing))
        .layer(middleware::from_fn(observability::security_headers)))
}

fn create_protected_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(auth::me))
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets/{id}", get(tickets::get_ticket))
        .route("/tickets/{id}", put(tickets::update_ticket))
        .route("/tickets/{id}/assign", put(tickets::assign_ticket))
        .route("/tickets/{id}/close", put(tickets::close_ticket))
        .route("/tickets/{id}/comments", get(comments::list_comments))
        .route("/tickets/{id}/comments", post(comments::add_comment))
        .route(
            "/tickets/{id}/attachments",
            get(attachments::list_attachments)
                .post(attachments::upload_attachment)
                .layer(DefaultBodyLimit::max(max_upload_bytes + 64 * 1024)),
        )
        .route("/users", get(users::list_users))
        .route("/users/{id}/role", put(users::set_role))
        .route("/audit", get(audit::list_audit))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
