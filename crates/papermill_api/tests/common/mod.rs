// All functions in this module are shared test helpers. Not every test
// binary uses every helper, so we suppress dead_code warnings here.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use papermill_api::auth::jwt::{generate_access_token, JwtConfig};
use papermill_api::config::{ApiKeyEntry, ServerConfig};
use papermill_api::router::build_app_router;
use papermill_api::state::AppState;
use papermill_db::queue::QueueService;
use papermill_db::DbPool;

/// A fully wired test application over a temp database and temp data roots.
pub struct TestApp {
    pub app: Router,
    pub pool: DbPool,
    pub queue: QueueService,
    pub config: ServerConfig,
    _data: TempDir,
}

/// Build a test `ServerConfig` with safe defaults rooted in `data_dir`.
pub fn test_config(data_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        api_port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_size_bytes: 16 * 1024 * 1024,
        upload_root: data_dir.join("uploads"),
        output_root: data_dir.join("output"),
        db_path: data_dir.join("papermill_test.db").display().to_string(),
        stale_timeout_minutes: 60,
        purge_retention_days: 7,
        maintenance_reset_interval_minutes: 5,
        maintenance_purge_interval_hours: 6,
        jwt: JwtConfig {
            secret: "test-secret-for-integration-tests-minimum-length".to_string(),
            access_token_expiry_mins: 60,
        },
        api_keys: vec![ApiKeyEntry {
            key: "svc-key".to_string(),
            user_id: "svc".to_string(),
            role: "admin".to_string(),
        }],
    }
}

/// Build the full application router with all middleware layers over a
/// fresh migrated database.
///
/// Delegates to [`build_app_router`] so integration tests exercise the
/// same middleware stack (CORS, request ID, timeout, body limit, panic
/// recovery) that production uses.
pub async fn setup() -> TestApp {
    let data = TempDir::new().expect("temp dir should be created");
    let config = test_config(data.path());

    let pool = papermill_db::create_pool(&config.db_path)
        .await
        .expect("pool should connect");
    papermill_db::run_migrations(&pool)
        .await
        .expect("migrations should apply");

    let queue = QueueService::new(
        pool.clone(),
        config.upload_root.clone(),
        config.output_root.clone(),
    );

    let state = AppState {
        pool: pool.clone(),
        queue: queue.clone(),
        config: Arc::new(config.clone()),
    };

    TestApp {
        app: build_app_router(state, &config),
        pool,
        queue,
        config,
        _data: data,
    }
}

/// Mint an access token for the given user and role.
pub fn token_for(config: &ServerConfig, user_id: &str, role: &str) -> String {
    generate_access_token(user_id, role, &config.jwt).expect("token generation should succeed")
}

// ---------------------------------------------------------------------------
// Shared HTTP test helpers
// ---------------------------------------------------------------------------

/// Collect the response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// GET from the given URI with a Bearer token.
pub async fn get_auth(app: &Router, uri: &str, token: &str) -> axum::response::Response {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// GET without credentials.
pub async fn get_anon(app: &Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// DELETE the given URI with a Bearer token.
pub async fn delete_auth(app: &Router, uri: &str, token: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// POST JSON with a Bearer token.
pub async fn post_json_auth(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Multipart submission helpers
// ---------------------------------------------------------------------------

const BOUNDARY: &str = "papermill-test-boundary";

/// Build a multipart body with one file part and arbitrary text fields.
pub fn multipart_body(file_name: &str, content: &[u8], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    body
}

/// POST a multipart submission with a Bearer token.
pub async fn submit_multipart(
    app: &Router,
    token: &str,
    file_name: &str,
    content: &[u8],
    fields: &[(&str, &str)],
) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/tasks/submit")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(multipart_body(file_name, content, fields)))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Store manipulation helpers
// ---------------------------------------------------------------------------

/// Backdate a task's claim so stale detection picks it up.
pub async fn backdate_started_at(pool: &DbPool, task_id: &str, minutes_ago: i64) {
    sqlx::query("UPDATE tasks SET started_at = ? WHERE task_id = ?")
        .bind(Utc::now() - chrono::Duration::minutes(minutes_ago))
        .bind(task_id)
        .execute(pool)
        .await
        .expect("backdate should succeed");
}

/// Backdate a task's completion for retention tests.
pub async fn backdate_completed_at(pool: &DbPool, task_id: &str, days_ago: i64) {
    sqlx::query("UPDATE tasks SET completed_at = ? WHERE task_id = ?")
        .bind(Utc::now() - chrono::Duration::days(days_ago))
        .bind(task_id)
        .execute(pool)
        .await
        .expect("backdate should succeed");
}
