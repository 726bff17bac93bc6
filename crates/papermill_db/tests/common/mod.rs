// Shared test helpers. Not every test binary uses every helper, so
// dead_code warnings are suppressed at the module level.
#![allow(dead_code)]

use chrono::Utc;
use tempfile::TempDir;

use papermill_db::models::task::NewTask;
use papermill_db::repositories::TaskRepo;
use papermill_db::DbPool;

/// Create a migrated pool backed by a temporary database file.
///
/// The [`TempDir`] must be kept alive for the duration of the test.
pub async fn create_test_pool() -> (DbPool, TempDir) {
    let tmp = TempDir::new().expect("temp dir should be created");
    let db_path = tmp.path().join("papermill_test.db");

    let pool = papermill_db::create_pool(db_path.to_str().unwrap())
        .await
        .expect("pool should connect");
    papermill_db::run_migrations(&pool)
        .await
        .expect("migrations should apply");

    (pool, tmp)
}

/// Build a `NewTask` with sensible test defaults.
pub fn new_task(task_id: &str, priority: i64, max_retries: i64) -> NewTask {
    NewTask {
        task_id: task_id.to_string(),
        owner_user_id: "tester".to_string(),
        file_name: format!("{task_id}.pdf"),
        file_path: format!("/tmp/uploads/{task_id}/{task_id}.pdf"),
        backend: "pipeline".to_string(),
        options: serde_json::json!({ "lang": "en" }),
        priority,
        max_retries,
    }
}

/// Insert a task row directly.
pub async fn seed_task(pool: &DbPool, task_id: &str, priority: i64, max_retries: i64) {
    TaskRepo::insert(pool, &new_task(task_id, priority, max_retries))
        .await
        .expect("insert should succeed");
}

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
