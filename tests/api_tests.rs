use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use deskd::config::Config;
use http_body_util::BodyExt;
use tower::ServiceExt;

async fn spawn_app() -> Router {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // A single connection keeps every request on the same in-memory database.
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.server.secure_cookies = false;
    config.security.expose_reset_tokens = true;
    config.uploads.upload_path = std::env::temp_dir()
        .join(format!("deskd-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();

    let state = deskd::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    deskd::api::router(state).await.expect("Failed to build router")
}

fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_cookie(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("expected a session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn register(app: &Router, username: &str, password: &str) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            serde_json::json!({"username": username, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            serde_json::json!({"username": username, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response)
}

#[tokio::test]
async fn register_then_login_resolves_the_same_user() {
    let app = spawn_app().await;

    register(&app, "alice", "correct-horse-battery").await;
    let cookie = login(&app, "alice", "correct-horse-battery").await;

    let response = app
        .clone()
        .oneshot(get_request("/api/me", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["user"]["username"], "alice");
    assert_eq!(body["data"]["user"]["role"], "user");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = spawn_app().await;

    register(&app, "alice", "correct-horse-battery").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            serde_json::json!({"username": "alice", "password": "another-password"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn bad_credentials_and_unknown_users_fail_identically() {
    let app = spawn_app().await;

    register(&app, "alice", "correct-horse-battery").await;

    let wrong_password = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            serde_json::json!({"username": "alice", "password": "wrong"}),
        ))
        .await
        .unwrap();
    let unknown_user = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            serde_json::json!({"username": "nobody", "password": "wrong"}),
        ))
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);

    // Identical bodies, so responses cannot be used to probe for usernames.
    let a = body_json(wrong_password).await;
    let b = body_json(unknown_user).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = spawn_app().await;

    for uri in ["/api/me", "/api/tickets", "/api/users", "/api/audit"] {
        let response = app.clone().oneshot(get_request(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn logout_is_idempotent() {
    let app = spawn_app().await;

    register(&app, "alice", "correct-horse-battery").await;
    let cookie = login(&app, "alice", "correct-horse-battery").await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/logout",
                Some(&cookie),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // The cookie no longer resolves.
    let response = app
        .clone()
        .oneshot(get_request("/api/me", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_round_trip_is_single_use() {
    let app = spawn_app().await;

    register(&app, "alice", "correct-horse-battery").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/request",
            None,
            serde_json::json!({"username": "alice"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let token = body["data"]["token"].as_str().expect("test config echoes tokens").to_string();

    // First redemption succeeds.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/reset",
            None,
            serde_json::json!({"token": token, "password": "brand-new-password"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second redemption with the same token fails.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/reset",
            None,
            serde_json::json!({"token": token, "password": "yet-another-password"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Old password is dead, new one works.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            serde_json::json!({"username": "alice", "password": "correct-horse-battery"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    login(&app, "alice", "brand-new-password").await;
}

#[tokio::test]
async fn reset_requests_do_not_reveal_whether_accounts_exist() {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.server.secure_cookies = false;
    config.security.expose_reset_tokens = true;
    config.uploads.upload_path = std::env::temp_dir()
        .join(format!("deskd-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();

    let state = deskd::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    let app = deskd::api::router(state.clone())
        .await
        .expect("Failed to build router");

    register(&app, "alice", "correct-horse-battery").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            serde_json::json!({"username": "alice", "password": "correct-horse-battery"}),
        ))
        .await
        .unwrap();
    let alice_id = body_json(response).await["data"]["user"]["id"].as_i64().unwrap();

    let known = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/request",
            None,
            serde_json::json!({"username": "alice"}),
        ))
        .await
        .unwrap();
    let unknown = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/request",
            None,
            serde_json::json!({"username": "nobody"}),
        ))
        .await
        .unwrap();

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);

    let unknown_body = body_json(unknown).await;
    assert_eq!(unknown_body["data"]["ok"], true);
    // No token exists for the unknown account even with echoing enabled.
    assert!(unknown_body["data"].get("token").is_none());

    // A redeemable token exists only for the account that is real.
    assert!(state.store().has_live_reset_token(alice_id).await.unwrap());
}

#[tokio::test]
async fn a_new_reset_request_invalidates_the_previous_token() {
    let app = spawn_app().await;

    register(&app, "alice", "correct-horse-battery").await;

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/password/request",
                None,
                serde_json::json!({"username": "alice"}),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        tokens.push(body["data"]["token"].as_str().unwrap().to_string());
    }

    // The first token died when the second was issued.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/reset",
            None,
            serde_json::json!({"token": tokens[0], "password": "brand-new-password"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/reset",
            None,
            serde_json::json!({"token": tokens[1], "password": "brand-new-password"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_endpoint_is_public() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(get_request("/api/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn short_passwords_are_rejected_at_registration() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            serde_json::json!({"username": "alice", "password": "short"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
