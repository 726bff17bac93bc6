//! Concurrent claim safety: many workers hammering one store must claim
//! every task exactly once.

mod common;

use std::collections::HashMap;

use common::{create_test_pool, seed_task};
use papermill_db::repositories::TaskRepo;

const TASK_COUNT: usize = 100;
const WORKER_COUNT: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_workers_never_double_claim() {
    let (pool, _tmp) = create_test_pool().await;

    for i in 0..TASK_COUNT {
        seed_task(&pool, &format!("task-{i:03}"), 0, 3).await;
    }

    let mut handles = Vec::new();
    for w in 0..WORKER_COUNT {
        let pool = pool.clone();
        let worker_id = format!("worker-{w}");
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                match TaskRepo::claim_next(&pool, &worker_id, &[]).await {
                    Ok(Some(task)) => claimed.push(task.task_id),
                    Ok(None) => break,
                    Err(e) => panic!("claim failed: {e}"),
                }
            }
            claimed
        }));
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for handle in handles {
        for task_id in handle.await.expect("worker task should not panic") {
            *counts.entry(task_id).or_default() += 1;
        }
    }

    assert_eq!(counts.len(), TASK_COUNT, "every task must be claimed");
    for (task_id, count) in counts {
        assert_eq!(count, 1, "task {task_id} claimed {count} times");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_task_goes_to_exactly_one_claimer() {
    let (pool, _tmp) = create_test_pool().await;
    seed_task(&pool, "contested", 0, 3).await;

    let mut handles = Vec::new();
    for w in 0..4 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            TaskRepo::claim_next(&pool, &format!("worker-{w}"), &[])
                .await
                .expect("claim should not error")
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
