//! Integration tests for the job state machine.
//!
//! Each test gets its own temporary database (via `codeindexer-test-utils`,
//! which shares a single Postgres container/instance across the binary) so
//! tests are isolated and can run concurrently.

use uuid::Uuid;

use codeindexer_db::models::{JobKind, JobStatus, JobTrigger};
use codeindexer_db::queries::jobs as job_db;
use codeindexer_db::queries::projects as project_db;
use codeindexer_test_utils::{create_test_db, drop_test_db};

use codeindexer_core::state::JobStateMachine;

// ---------------------------------------------------------------------------
// Unit tests: transition validation (no DB needed)
// ---------------------------------------------------------------------------

#[test]
fn valid_transitions_accepted() {
    let valid = [
        (JobStatus::Pending, JobStatus::Running),
        (JobStatus::Pending, JobStatus::Cancelled),
        (JobStatus::Running, JobStatus::Completed),
        (JobStatus::Running, JobStatus::Failed),
        (JobStatus::Running, JobStatus::Cancelled),
    ];
    for (from, to) in valid {
        assert!(
            JobStateMachine::is_valid_transition(from, to),
            "expected {from} -> {to} to be valid"
        );
    }
}

#[test]
fn invalid_transitions_rejected() {
    let invalid = [
        (JobStatus::Pending, JobStatus::Completed),
        (JobStatus::Pending, JobStatus::Failed),
        (JobStatus::Running, JobStatus::Pending),
        (JobStatus::Completed, JobStatus::Running),
        (JobStatus::Completed, JobStatus::Failed),
        (JobStatus::Failed, JobStatus::Running),
        (JobStatus::Cancelled, JobStatus::Running),
    ];
    for (from, to) in invalid {
        assert!(
            !JobStateMachine::is_valid_transition(from, to),
            "expected {from} -> {to} to be invalid"
        );
    }
}

// ---------------------------------------------------------------------------
// Integration tests: transitions against a real database
// ---------------------------------------------------------------------------

async fn insert_test_job(pool: &sqlx::PgPool, kind: JobKind) -> codeindexer_db::models::Job {
    let project = project_db::insert_project(pool, "state-machine-test-project")
        .await
        .expect("failed to insert project");
    job_db::insert_job(
        pool,
        project.id,
        None,
        kind,
        0,
        JobTrigger::Manual,
        None,
        None,
    )
    .await
    .expect("failed to insert job")
}

#[tokio::test]
async fn happy_path_pending_to_completed() {
    let (pool, db_name) = create_test_db().await;

    let job = insert_test_job(&pool, JobKind::ApiAnalysis).await;
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.started_at.is_none());

    JobStateMachine::transition(&pool, job.id, JobStatus::Pending, JobStatus::Running)
        .await
        .expect("pending -> running should succeed");
    let j = job_db::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(j.status, JobStatus::Running);
    assert!(j.started_at.is_some());
    assert!(j.completed_at.is_none());

    JobStateMachine::transition(&pool, job.id, JobStatus::Running, JobStatus::Completed)
        .await
        .expect("running -> completed should succeed");
    let j = job_db::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(j.status, JobStatus::Completed);
    assert!(j.completed_at.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn running_job_can_fail_or_be_cancelled() {
    let (pool, db_name) = create_test_db().await;

    let failing = insert_test_job(&pool, JobKind::ApiAnalysis).await;
    JobStateMachine::transition(&pool, failing.id, JobStatus::Pending, JobStatus::Running)
        .await
        .unwrap();
    JobStateMachine::transition(&pool, failing.id, JobStatus::Running, JobStatus::Failed)
        .await
        .expect("running -> failed should succeed");
    let j = job_db::get_job(&pool, failing.id).await.unwrap().unwrap();
    assert_eq!(j.status, JobStatus::Failed);
    assert!(j.completed_at.is_some());

    let cancelled = insert_test_job(&pool, JobKind::ApiAnalysis).await;
    JobStateMachine::transition(&pool, cancelled.id, JobStatus::Pending, JobStatus::Cancelled)
        .await
        .expect("pending -> cancelled should succeed");
    let j = job_db::get_job(&pool, cancelled.id).await.unwrap().unwrap();
    assert_eq!(j.status, JobStatus::Cancelled);
    assert!(j.started_at.is_none(), "never started, so startedAt stays unset");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn invalid_transition_rejected_at_db_level() {
    let (pool, db_name) = create_test_db().await;

    let job = insert_test_job(&pool, JobKind::ApiAnalysis).await;

    let result =
        JobStateMachine::transition(&pool, job.id, JobStatus::Pending, JobStatus::Completed).await;
    assert!(result.is_err(), "pending -> completed should fail");
    let err_msg = format!("{}", result.unwrap_err());
    assert!(
        err_msg.contains("invalid state transition"),
        "error should mention invalid transition: {err_msg}"
    );

    let j = job_db::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(j.status, JobStatus::Pending);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn optimistic_lock_prevents_double_transition() {
    let (pool, db_name) = create_test_db().await;

    let job = insert_test_job(&pool, JobKind::ApiAnalysis).await;
    JobStateMachine::transition(&pool, job.id, JobStatus::Pending, JobStatus::Running)
        .await
        .unwrap();

    let result =
        JobStateMachine::transition(&pool, job.id, JobStatus::Pending, JobStatus::Running).await;
    assert!(result.is_err(), "double transition should fail");
    let err_msg = format!("{}", result.unwrap_err());
    assert!(
        err_msg.contains("optimistic lock failed"),
        "error should mention optimistic lock: {err_msg}"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn job_not_found_gives_clear_error() {
    let (pool, db_name) = create_test_db().await;

    let fake_id = Uuid::new_v4();
    let result =
        JobStateMachine::transition(&pool, fake_id, JobStatus::Pending, JobStatus::Running).await;

    assert!(result.is_err());
    let err_msg = format!("{}", result.unwrap_err());
    assert!(
        err_msg.contains("not found"),
        "error should say 'not found': {err_msg}"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn concurrent_transitions_handled_safely() {
    let (pool, db_name) = create_test_db().await;

    let job = insert_test_job(&pool, JobKind::ApiAnalysis).await;
    let job_id = job.id;

    let pool1 = pool.clone();
    let pool2 = pool.clone();
    let handle1 = tokio::spawn(async move {
        JobStateMachine::transition(&pool1, job_id, JobStatus::Pending, JobStatus::Running).await
    });
    let handle2 = tokio::spawn(async move {
        JobStateMachine::transition(&pool2, job_id, JobStatus::Pending, JobStatus::Running).await
    });

    let result1 = handle1.await.unwrap();
    let result2 = handle2.await.unwrap();

    let successes = [result1.is_ok(), result2.is_ok()].into_iter().filter(|x| *x).count();
    assert_eq!(
        successes, 1,
        "exactly one concurrent transition should succeed, but {successes} did"
    );

    let j = job_db::get_job(&pool, job_id).await.unwrap().unwrap();
    assert_eq!(j.status, JobStatus::Running);

    pool.close().await;
    drop_test_db(&db_name).await;
}
