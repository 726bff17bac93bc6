//! QueueService tests: principal scoping, submission defaults, cancel
//! outcomes, and retention cleanup of artifact directories.

mod common;

use std::path::PathBuf;

use common::{backdate_completed_at, create_test_pool, seed_task};
use tempfile::TempDir;

use papermill_core::principal::{Principal, ROLE_ADMIN, ROLE_OPERATOR, ROLE_VIEWER};
use papermill_db::models::status::TaskStatus;
use papermill_db::models::task::TaskListQuery;
use papermill_db::queue::{CancelOutcome, QueueError, QueueService, SubmitTask};
use papermill_db::repositories::TaskRepo;
use papermill_db::DbPool;

fn principal(user_id: &str, role: &str) -> Principal {
    Principal {
        user_id: user_id.to_string(),
        role: role.to_string(),
    }
}

fn submit_input(task_id: &str, backend: &str, file_name: &str) -> SubmitTask {
    SubmitTask {
        task_id: task_id.to_string(),
        file_name: file_name.to_string(),
        file_path: format!("/tmp/uploads/{task_id}/{file_name}"),
        backend: backend.to_string(),
        options: serde_json::json!({}),
        priority: None,
        max_retries: None,
    }
}

fn service(pool: &DbPool, roots: &TempDir) -> QueueService {
    QueueService::new(
        pool.clone(),
        roots.path().join("uploads"),
        roots.path().join("output"),
    )
}

#[tokio::test]
async fn submit_applies_defaults_and_resolves_auto() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    let task = queue
        .submit(
            &principal("alice", ROLE_OPERATOR),
            submit_input("t1", "auto", "paper.pdf"),
        )
        .await
        .expect("submit should succeed");

    assert_eq!(task.backend, "pipeline");
    assert_eq!(task.priority, 0);
    assert_eq!(task.max_retries, 3);
    assert_eq!(task.owner_user_id, "alice");
    assert_eq!(task.status, TaskStatus::Pending);
}

#[tokio::test]
async fn submit_rejects_unknown_backend() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    let result = queue
        .submit(
            &principal("alice", ROLE_OPERATOR),
            submit_input("t1", "word2vec", "paper.pdf"),
        )
        .await;
    assert!(matches!(result, Err(QueueError::InvalidInput(_))));
}

#[tokio::test]
async fn submit_rejects_viewers() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    let result = queue
        .submit(
            &principal("eve", ROLE_VIEWER),
            submit_input("t1", "pipeline", "paper.pdf"),
        )
        .await;
    assert!(matches!(result, Err(QueueError::PermissionDenied(_))));
}

#[tokio::test]
async fn owner_isolation_hides_foreign_tasks() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    queue
        .submit(
            &principal("alice", ROLE_OPERATOR),
            submit_input("t-alice", "pipeline", "a.pdf"),
        )
        .await
        .unwrap();
    queue
        .submit(
            &principal("bob", ROLE_OPERATOR),
            submit_input("t-bob", "pipeline", "b.pdf"),
        )
        .await
        .unwrap();

    // Bob cannot see Alice's task; the id reads as not-found.
    let result = queue.get_for(&principal("bob", ROLE_OPERATOR), "t-alice").await;
    assert!(matches!(result, Err(QueueError::NotFound(_))));

    // Listing is scoped to the caller.
    let (tasks, total) = queue
        .list_for(&principal("bob", ROLE_OPERATOR), &TaskListQuery::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(tasks[0].task_id, "t-bob");

    // Admins see everything.
    let (_, total) = queue
        .list_for(&principal("root", ROLE_ADMIN), &TaskListQuery::default())
        .await
        .unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn list_rejects_bad_status_filter() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    let query = TaskListQuery {
        status: Some("sleeping".to_string()),
        ..Default::default()
    };
    let result = queue.list_for(&principal("alice", ROLE_OPERATOR), &query).await;
    assert!(matches!(result, Err(QueueError::InvalidInput(_))));
}

#[tokio::test]
async fn cancel_pending_removes_upload_dir() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    let alice = principal("alice", ROLE_OPERATOR);
    queue
        .submit(&alice, submit_input("t1", "pipeline", "a.pdf"))
        .await
        .unwrap();

    let upload_dir = queue.task_upload_dir("t1");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::write(upload_dir.join("a.pdf"), b"%PDF-1.4").unwrap();

    let outcome = queue.cancel_for(&alice, "t1").await.unwrap();
    assert_eq!(outcome, CancelOutcome::Cancelled);
    assert!(!upload_dir.exists());

    let task = queue.get_for(&alice, "t1").await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn cancel_processing_sets_flag() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    let alice = principal("alice", ROLE_OPERATOR);
    queue
        .submit(&alice, submit_input("t1", "pipeline", "a.pdf"))
        .await
        .unwrap();
    queue.claim_next("w1", &[]).await.unwrap().unwrap();

    let outcome = queue.cancel_for(&alice, "t1").await.unwrap();
    assert_eq!(outcome, CancelOutcome::InFlight);
    assert!(queue.cancel_requested("t1").await.unwrap());
}

#[tokio::test]
async fn cancel_terminal_conflicts() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    let alice = principal("alice", ROLE_OPERATOR);
    queue
        .submit(&alice, submit_input("t1", "pipeline", "a.pdf"))
        .await
        .unwrap();
    queue.claim_next("w1", &[]).await.unwrap().unwrap();
    queue
        .complete("t1", "w1", "/out/t1", Some("t1.md"), None)
        .await
        .unwrap();

    let result = queue.cancel_for(&alice, "t1").await;
    assert!(matches!(result, Err(QueueError::Conflict(_))));
}

#[tokio::test]
async fn purge_old_deletes_rows_and_artifact_dirs() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    // Old completed task with an artifact directory on disk.
    seed_task(&pool, "old", 0, 3).await;
    TaskRepo::claim_next(&pool, "w1", &[]).await.unwrap().unwrap();
    let result_dir: PathBuf = queue.task_output_dir("old");
    std::fs::create_dir_all(&result_dir).unwrap();
    std::fs::write(result_dir.join("old.md"), "# old").unwrap();
    TaskRepo::complete(
        &pool,
        "old",
        "w1",
        result_dir.to_str().unwrap(),
        Some("old.md"),
        None,
    )
    .await
    .unwrap()
    .unwrap();
    backdate_completed_at(&pool, "old", 30).await;

    // Recent completed task stays.
    seed_task(&pool, "fresh", 0, 3).await;
    TaskRepo::claim_next(&pool, "w1", &[]).await.unwrap().unwrap();
    TaskRepo::complete(&pool, "fresh", "w1", "/out/fresh", Some("fresh.md"), None)
        .await
        .unwrap()
        .unwrap();

    let deleted = queue.purge_old(chrono::Duration::days(7)).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(!result_dir.exists(), "artifact dir must be removed");

    assert!(TaskRepo::find_by_id(&pool, "old").await.unwrap().is_none());
    assert!(TaskRepo::find_by_id(&pool, "fresh").await.unwrap().is_some());

    // Audit rows cascade with the task.
    assert!(TaskRepo::transitions(&pool, "old").await.unwrap().is_empty());
}

#[tokio::test]
async fn finish_cancelled_discards_artifacts() {
    let (pool, _tmp) = create_test_pool().await;
    let roots = TempDir::new().unwrap();
    let queue = service(&pool, &roots);

    let alice = principal("alice", ROLE_OPERATOR);
    queue
        .submit(&alice, submit_input("t1", "pipeline", "a.pdf"))
        .await
        .unwrap();
    queue.claim_next("w1", &[]).await.unwrap().unwrap();
    queue.cancel_for(&alice, "t1").await.unwrap();

    // Engine already produced partial output before the worker noticed.
    let out_dir = queue.task_output_dir("t1");
    std::fs::create_dir_all(&out_dir).unwrap();
    std::fs::write(out_dir.join("t1.md"), "partial").unwrap();

    let task = queue.finish_cancelled("t1", "w1").await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(!out_dir.exists(), "partial output must be discarded");
}
