//! Tests for admin maintenance endpoints: RBAC and behavior.

mod common;

use axum::http::StatusCode;
use common::{
    backdate_completed_at, backdate_started_at, body_json, post_json_auth, setup,
    submit_multipart, token_for,
};
use serde_json::json;

use papermill_db::models::status::TaskStatus;
use papermill_db::repositories::TaskRepo;

#[tokio::test]
async fn maintenance_endpoints_require_admin() {
    let test_app = setup().await;
    let operator = token_for(&test_app.config, "alice", "operator");

    let response = post_json_auth(
        &test_app.app,
        "/api/v1/admin/queue/reset-stale",
        json!({ "timeout_minutes": 60 }),
        &operator,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = post_json_auth(
        &test_app.app,
        "/api/v1/admin/queue/cleanup",
        json!({ "retention_days": 7 }),
        &operator,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reset_stale_requeues_abandoned_claims() {
    let test_app = setup().await;
    let operator = token_for(&test_app.config, "alice", "operator");
    let admin = token_for(&test_app.config, "root", "admin");

    let response = submit_multipart(&test_app.app, &operator, "a.pdf", b"%PDF-1.4", &[]).await;
    let task_id = body_json(response).await["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    // A phantom worker claims the task and disappears.
    TaskRepo::claim_next(&test_app.pool, "phantom", &[])
        .await
        .unwrap()
        .unwrap();
    backdate_started_at(&test_app.pool, &task_id, 120).await;

    let response = post_json_auth(
        &test_app.app,
        "/api/v1/admin/queue/reset-stale",
        json!({ "timeout_minutes": 60 }),
        &admin,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["reset_count"], 1);

    let task = TaskRepo::find_by_id(&test_app.pool, &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retry_count, 1);
}

#[tokio::test]
async fn cleanup_deletes_old_terminal_tasks() {
    let test_app = setup().await;
    let operator = token_for(&test_app.config, "alice", "operator");
    let admin = token_for(&test_app.config, "root", "admin");

    let response = submit_multipart(&test_app.app, &operator, "a.pdf", b"%PDF-1.4", &[]).await;
    let task_id = body_json(response).await["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    TaskRepo::claim_next(&test_app.pool, "w1", &[])
        .await
        .unwrap()
        .unwrap();
    let result_dir = test_app.queue.task_output_dir(&task_id);
    std::fs::create_dir_all(&result_dir).unwrap();
    std::fs::write(result_dir.join("a.md"), "# A").unwrap();
    TaskRepo::complete(
        &test_app.pool,
        &task_id,
        "w1",
        result_dir.to_str().unwrap(),
        Some("a.md"),
        None,
    )
    .await
    .unwrap()
    .unwrap();
    backdate_completed_at(&test_app.pool, &task_id, 30).await;

    let response = post_json_auth(
        &test_app.app,
        "/api/v1/admin/queue/cleanup",
        json!({ "retention_days": 7 }),
        &admin,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["deleted_count"], 1);

    assert!(TaskRepo::find_by_id(&test_app.pool, &task_id)
        .await
        .unwrap()
        .is_none());
    assert!(!result_dir.exists());
}

#[tokio::test]
async fn maintenance_defaults_come_from_config() {
    let test_app = setup().await;
    let admin = token_for(&test_app.config, "root", "admin");

    // Empty bodies fall back to the configured thresholds.
    let response = post_json_auth(
        &test_app.app,
        "/api/v1/admin/queue/reset-stale",
        json!({}),
        &admin,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["reset_count"], 0);
}

#[tokio::test]
async fn non_positive_thresholds_are_rejected() {
    let test_app = setup().await;
    let admin = token_for(&test_app.config, "root", "admin");

    let response = post_json_auth(
        &test_app.app,
        "/api/v1/admin/queue/reset-stale",
        json!({ "timeout_minutes": 0 }),
        &admin,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json_auth(
        &test_app.app,
        "/api/v1/admin/queue/cleanup",
        json!({ "retention_days": -1 }),
        &admin,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
