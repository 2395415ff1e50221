use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use deskd::config::Config;
use http_body_util::BodyExt;
use tower::ServiceExt;

fn test_config() -> Config {
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
    config
}

async fn spawn_app() -> Router {
    spawn_app_with(test_config()).await
}

async fn spawn_app_with(config: Config) -> Router {
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

fn multipart_request(uri: &str, cookie: &str, filename: &str, contents: &[u8]) -> Request<Body> {
    let boundary = "deskd-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .unwrap()
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

/// Register + login, returning (cookie, user id).
async fn signup(app: &Router, username: &str) -> (String, i64) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            serde_json::json!({"username": username, "password": "a-solid-password"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    login(app, username, "a-solid-password").await
}

async fn login(app: &Router, username: &str, password: &str) -> (String, i64) {
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
    let cookie = session_cookie(&response);
    let body = body_json(response).await;
    let id = body["data"]["user"]["id"].as_i64().unwrap();
    (cookie, id)
}

/// The migration seeds an admin account for bootstrap.
async fn admin_login(app: &Router) -> (String, i64) {
    login(app, "admin", "admin").await
}

async fn promote(app: &Router, admin_cookie: &str, user_id: i64, role: &str) {
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{user_id}/role"),
            Some(admin_cookie),
            serde_json::json!({"role": role}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn create_ticket(
    app: &Router,
    cookie: &str,
    title: &str,
    priority: &str,
) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tickets",
            Some(cookie),
            serde_json::json!({
                "title": title,
                "description": "Something is broken and needs attention.",
                "priority": priority,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

async fn audit_entries(app: &Router, admin_cookie: &str) -> Vec<serde_json::Value> {
    let response = app
        .clone()
        .oneshot(get_request("/api/audit?size=100", Some(admin_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"]["items"]
        .as_array()
        .unwrap()
        .clone()
}

#[tokio::test]
async fn printer_scenario_end_to_end() {
    let app = spawn_app().await;
    let (admin_cookie, _) = admin_login(&app).await;

    let (alice_cookie, _) = signup(&app, "alice").await;
    let (bob_cookie, bob_id) = signup(&app, "bob").await;
    promote(&app, &admin_cookie, bob_id, "tech").await;

    // Alice files the ticket.
    let ticket = create_ticket(&app, &alice_cookie, "Printer broken", "High").await;
    let ticket_id = ticket["id"].as_i64().unwrap();
    assert_eq!(ticket["status"], "Open");
    assert_eq!(ticket["priority"], "High");
    assert!(ticket["assigned_to"].is_null());
    assert_eq!(ticket["sla"], "OnTime");

    // Bob assigns it to himself.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/assign"),
            Some(&bob_cookie),
            serde_json::json!({"user_id": bob_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let assigned = body_json(response).await;
    assert_eq!(assigned["data"]["assigned_to"].as_i64(), Some(bob_id));

    // Bob closes it.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/close"),
            Some(&bob_cookie),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "Closed");

    // The audit trail recorded the assignment and the closure.
    let entries = audit_entries(&app, &admin_cookie).await;
    let on_ticket: Vec<_> = entries
        .iter()
        .filter(|e| e["entity"] == "ticket" && e["entity_id"].as_i64() == Some(ticket_id))
        .collect();
    assert!(on_ticket.iter().any(|e| e["action"] == "assign"));
    assert!(on_ticket.iter().any(|e| e["action"] == "close"));

    // Filtering by Closed returns exactly this ticket.
    let response = app
        .clone()
        .oneshot(get_request("/api/tickets?status=Closed", Some(&bob_cookie)))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["data"]["total"], 1);
    assert_eq!(page["data"]["items"][0]["id"].as_i64(), Some(ticket_id));
}

#[tokio::test]
async fn close_is_idempotent_and_audited_once() {
    let app = spawn_app().await;
    let (admin_cookie, _) = admin_login(&app).await;

    let (alice_cookie, _) = signup(&app, "alice").await;
    let (bob_cookie, bob_id) = signup(&app, "bob").await;
    promote(&app, &admin_cookie, bob_id, "tech").await;

    let ticket = create_ticket(&app, &alice_cookie, "Flickering screen", "Normal").await;
    let ticket_id = ticket["id"].as_i64().unwrap();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/api/tickets/{ticket_id}/close"),
                Some(&bob_cookie),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["status"], "Closed");
    }

    let entries = audit_entries(&app, &admin_cookie).await;
    let closes = entries
        .iter()
        .filter(|e| {
            e["action"] == "close" && e["entity_id"].as_i64() == Some(ticket_id)
        })
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test]
async fn plain_users_cannot_assign_or_change_roles() {
    let app = spawn_app().await;
    let (admin_cookie, _) = admin_login(&app).await;

    let (alice_cookie, alice_id) = signup(&app, "alice").await;
    let ticket = create_ticket(&app, &alice_cookie, "Mouse missing", "Low").await;
    let ticket_id = ticket["id"].as_i64().unwrap();

    let audit_before = audit_entries(&app, &admin_cookie).await.len();

    // Assigning, even to herself on her own ticket, is staff-only.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/assign"),
            Some(&alice_cookie),
            serde_json::json!({"user_id": alice_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // So is changing roles.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{alice_id}/role"),
            Some(&alice_cookie),
            serde_json::json!({"role": "admin"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Neither denial touched the ticket or the audit trail.
    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/tickets/{ticket_id}"), Some(&alice_cookie)))
        .await
        .unwrap();
    assert!(body_json(response).await["data"]["assigned_to"].is_null());

    let audit_after = audit_entries(&app, &admin_cookie).await.len();
    assert_eq!(audit_before, audit_after);
}

#[tokio::test]
async fn owners_shuffle_working_states_but_cannot_close() {
    let app = spawn_app().await;
    let (admin_cookie, _) = admin_login(&app).await;

    let (alice_cookie, _) = signup(&app, "alice").await;
    let (bob_cookie, bob_id) = signup(&app, "bob").await;
    promote(&app, &admin_cookie, bob_id, "tech").await;

    let ticket = create_ticket(&app, &alice_cookie, "VPN drops hourly", "Normal").await;
    let ticket_id = ticket["id"].as_i64().unwrap();

    // Open -> In Progress on her own unassigned ticket is fine.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&alice_cookie),
            serde_json::json!({"status": "In Progress"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "In Progress");

    // Closing is out of reach for the owner.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&alice_cookie),
            serde_json::json!({"status": "Closed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Once staff picks it up, the owner loses status control entirely.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/assign"),
            Some(&bob_cookie),
            serde_json::json!({"user_id": bob_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&alice_cookie),
            serde_json::json!({"status": "Open"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Staff can reopen a closed ticket.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/close"),
            Some(&bob_cookie),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&bob_cookie),
            serde_json::json!({"status": "Open"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "Open");
}

#[tokio::test]
async fn critical_priority_is_update_only_and_staff_only() {
    let app = spawn_app().await;
    let (admin_cookie, _) = admin_login(&app).await;

    let (alice_cookie, _) = signup(&app, "alice").await;
    let (bob_cookie, bob_id) = signup(&app, "bob").await;
    promote(&app, &admin_cookie, bob_id, "tech").await;

    // Critical is rejected at creation.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tickets",
            Some(&alice_cookie),
            serde_json::json!({
                "title": "Server room on fire",
                "description": "Literally on fire.",
                "priority": "Critical",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let ticket = create_ticket(&app, &alice_cookie, "Server room on fire", "High").await;
    let ticket_id = ticket["id"].as_i64().unwrap();

    // The owner cannot escalate priority herself.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&alice_cookie),
            serde_json::json!({"priority": "Critical"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Staff can.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&bob_cookie),
            serde_json::json!({"priority": "Critical"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["priority"], "Critical");

    let entries = audit_entries(&app, &admin_cookie).await;
    assert!(entries.iter().any(|e| {
        e["action"] == "update"
            && e["entity_id"].as_i64() == Some(ticket_id)
            && e["details"].as_str().unwrap().contains("priority: High -> Critical")
    }));
}

#[tokio::test]
async fn listing_is_scoped_for_users_and_paginated() {
    let app = spawn_app().await;
    let (admin_cookie, _) = admin_login(&app).await;

    let (alice_cookie, _) = signup(&app, "alice").await;
    let (carol_cookie, _) = signup(&app, "carol").await;
    let (bob_cookie, bob_id) = signup(&app, "bob").await;
    promote(&app, &admin_cookie, bob_id, "tech").await;

    for n in 0..3 {
        create_ticket(&app, &alice_cookie, &format!("Alice issue {n}"), "Normal").await;
    }
    for n in 0..2 {
        create_ticket(&app, &carol_cookie, &format!("Carol issue {n}"), "Low").await;
    }

    // Alice only sees her own three.
    let response = app
        .clone()
        .oneshot(get_request("/api/tickets", Some(&alice_cookie)))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["data"]["total"], 3);

    // Staff sees all five, newest first, and can page through them.
    let response = app
        .clone()
        .oneshot(get_request("/api/tickets?page=1&size=2", Some(&bob_cookie)))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["data"]["total"], 5);
    assert_eq!(page["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["data"]["page"], 1);
    assert_eq!(page["data"]["size"], 2);

    // Priority filter composes with the scope.
    let response = app
        .clone()
        .oneshot(get_request("/api/tickets?priority=Low", Some(&bob_cookie)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["data"]["total"], 2);

    // An oversized page size is capped rather than rejected.
    let response = app
        .clone()
        .oneshot(get_request("/api/tickets?size=5000", Some(&bob_cookie)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["data"]["size"], 100);
}

#[tokio::test]
async fn comments_are_validated_ordered_and_access_checked() {
    let app = spawn_app().await;

    let (alice_cookie, _) = signup(&app, "alice").await;
    let (carol_cookie, _) = signup(&app, "carol").await;

    let ticket = create_ticket(&app, &alice_cookie, "Keyboard types by itself", "Normal").await;
    let ticket_id = ticket["id"].as_i64().unwrap();

    // Whitespace-only content is rejected.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/tickets/{ticket_id}/comments"),
            Some(&alice_cookie),
            serde_json::json!({"content": "   "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for text in ["First observation", "It stopped overnight"] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/tickets/{ticket_id}/comments"),
                Some(&alice_cookie),
                serde_json::json!({"content": text}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // A stranger can neither read nor write the thread.
    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/tickets/{ticket_id}/comments"), Some(&carol_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/tickets/{ticket_id}/comments"),
            Some(&carol_cookie),
            serde_json::json!({"content": "drive-by"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The owner reads them back oldest-first with author names.
    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/tickets/{ticket_id}/comments"), Some(&alice_cookie)))
        .await
        .unwrap();
    let comments = body_json(response).await["data"].as_array().unwrap().clone();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["content"], "First observation");
    assert_eq!(comments[1]["content"], "It stopped overnight");
    assert_eq!(comments[0]["author"], "alice");
}

#[tokio::test]
async fn attachments_enforce_extension_and_size_limits() {
    let mut config = test_config();
    config.uploads.max_upload_bytes = 1024;
    let app = spawn_app_with(config).await;

    let (alice_cookie, _) = signup(&app, "alice").await;
    let ticket = create_ticket(&app, &alice_cookie, "Crash dump attached", "Normal").await;
    let ticket_id = ticket["id"].as_i64().unwrap();
    let uri = format!("/api/tickets/{ticket_id}/attachments");

    // A plain text file within the limit is accepted.
    let response = app
        .clone()
        .oneshot(multipart_request(&uri, &alice_cookie, "notes.txt", b"it crashed at 9am"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let attachment = body_json(response).await["data"].clone();
    assert_eq!(attachment["filename"], "notes.txt");
    assert_eq!(attachment["mime"], "text/plain");
    assert_eq!(attachment["size"], 17);

    // Disallowed extension.
    let response = app
        .clone()
        .oneshot(multipart_request(&uri, &alice_cookie, "payload.exe", b"MZ"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Over the configured ceiling.
    let big = vec![b'x'; 2048];
    let response = app
        .clone()
        .oneshot(multipart_request(&uri, &alice_cookie, "big.log", &big))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    // Only the accepted upload is listed.
    let response = app
        .clone()
        .oneshot(get_request(&uri, Some(&alice_cookie)))
        .await
        .unwrap();
    let listed = body_json(response).await["data"].as_array().unwrap().clone();
    assert_eq!(listed.len(), 1);
    assert!(listed[0]["path"].as_str().unwrap().ends_with("_notes.txt"));
}

#[tokio::test]
async fn audit_readback_is_admin_only_and_newest_first() {
    let app = spawn_app().await;
    let (admin_cookie, _) = admin_login(&app).await;

    let (alice_cookie, _) = signup(&app, "alice").await;
    let (bob_cookie, bob_id) = signup(&app, "bob").await;
    promote(&app, &admin_cookie, bob_id, "tech").await;

    create_ticket(&app, &alice_cookie, "First", "Normal").await;
    create_ticket(&app, &alice_cookie, "Second", "Normal").await;

    // Techs can see users but not the audit trail.
    let response = app
        .clone()
        .oneshot(get_request("/api/users", Some(&bob_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/api/audit", Some(&bob_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Plain users can see neither.
    let response = app
        .clone()
        .oneshot(get_request("/api/users", Some(&alice_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin readback is newest-first; the set_role entry is recorded.
    let entries = audit_entries(&app, &admin_cookie).await;
    assert!(entries.len() >= 3);
    let ids: Vec<i64> = entries.iter().map(|e| e["id"].as_i64().unwrap()).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(ids, sorted);
    assert!(entries.iter().any(|e| {
        e["action"] == "set_role" && e["entity_id"].as_i64() == Some(bob_id) && e["details"] == "tech"
    }));
}

#[tokio::test]
async fn assignment_requires_a_staff_assignee() {
    let app = spawn_app().await;
    let (admin_cookie, _) = admin_login(&app).await;

    let (alice_cookie, alice_id) = signup(&app, "alice").await;
    let (bob_cookie, bob_id) = signup(&app, "bob").await;
    promote(&app, &admin_cookie, bob_id, "tech").await;

    let ticket = create_ticket(&app, &alice_cookie, "Laptop battery swollen", "High").await;
    let ticket_id = ticket["id"].as_i64().unwrap();

    // Assigning to a plain user fails.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/assign"),
            Some(&bob_cookie),
            serde_json::json!({"user_id": alice_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // As does assigning to nobody.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/assign"),
            Some(&bob_cookie),
            serde_json::json!({"user_id": 99_999}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Missing tickets are distinguished from bad assignees.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/tickets/99999/assign",
            Some(&bob_cookie),
            serde_json::json!({"user_id": bob_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
