//! Queries against the `index_jobs` table.
//!
//! State-machine edges go through [`transition_job_status`], which is
//! optimistically locked on the expected prior status: `UPDATE ... WHERE id
//! = $1 AND status = $2`. A `rows_affected() == 0` result means either the
//! row doesn't exist or another writer already moved it, and callers
//! distinguish the two by re-fetching.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Job, JobKind, JobStatus, JobTrigger};

#[allow(clippy::too_many_arguments)]
pub async fn insert_job(
    pool: &PgPool,
    project_id: Uuid,
    codebase_id: Option<Uuid>,
    kind: JobKind,
    priority: i32,
    trigger: JobTrigger,
    base_commit: Option<&str>,
    description: Option<&str>,
) -> Result<Job> {
    sqlx::query_as::<_, Job>(
        "INSERT INTO index_jobs \
            (project_id, codebase_id, kind, status, priority, trigger, base_commit, description, \
             progress, retry_count, metadata) \
         VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, 0, 0, '{}'::jsonb) \
         RETURNING *",
    )
    .bind(project_id)
    .bind(codebase_id)
    .bind(kind)
    .bind(priority)
    .bind(trigger)
    .bind(base_commit)
    .bind(description)
    .fetch_one(pool)
    .await
    .context("failed to insert job")
}

pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<Option<Job>> {
    sqlx::query_as::<_, Job>("SELECT * FROM index_jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch job")
}

/// Jobs for a codebase that have not reached a terminal state.
pub async fn find_active_for_codebase(pool: &PgPool, codebase_id: Uuid) -> Result<Vec<Job>> {
    sqlx::query_as::<_, Job>(
        "SELECT * FROM index_jobs \
         WHERE codebase_id = $1 AND status IN ('pending', 'running') \
         ORDER BY created_at ASC",
    )
    .bind(codebase_id)
    .fetch_all(pool)
    .await
    .context("failed to list active jobs for codebase")
}

/// Whether a codebase-scoped job is currently admitted for this codebase.
/// Used to enforce the single-active-codebase-job rule (`CONCURRENT_CODEBASE_JOB`).
pub async fn has_active_job_for_codebase(pool: &PgPool, codebase_id: Uuid) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM index_jobs \
         WHERE codebase_id = $1 AND status IN ('pending', 'running')",
    )
    .bind(codebase_id)
    .fetch_one(pool)
    .await
    .context("failed to check for active codebase job")?;
    Ok(count > 0)
}

/// The most recent terminal jobs for a codebase, newest first.
pub async fn find_recent_for_codebase(pool: &PgPool, codebase_id: Uuid, limit: i64) -> Result<Vec<Job>> {
    sqlx::query_as::<_, Job>(
        "SELECT * FROM index_jobs \
         WHERE codebase_id = $1 AND status IN ('completed', 'failed', 'cancelled') \
         ORDER BY completed_at DESC NULLS LAST \
         LIMIT $2",
    )
    .bind(codebase_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list recent jobs for codebase")
}

/// Optimistically-locked state-machine transition.
///
/// Returns the number of rows affected: `1` on success, `0` if the row is
/// missing or its status no longer matches `from`.
pub async fn transition_job_status(
    pool: &PgPool,
    id: Uuid,
    from: JobStatus,
    to: JobStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE index_jobs \
         SET status = $1, \
             started_at = COALESCE($2, started_at), \
             completed_at = COALESCE($3, completed_at), \
             updated_at = now() \
         WHERE id = $4 AND status = $5",
    )
    .bind(to)
    .bind(started_at)
    .bind(completed_at)
    .bind(id)
    .bind(from)
    .execute(pool)
    .await
    .context("failed to transition job status")?;

    Ok(result.rows_affected())
}

/// Record the final error on a job that transitioned to `FAILED`.
pub async fn set_job_error(pool: &PgPool, id: Uuid, error: &str, error_stack: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE index_jobs SET error = $1, error_stack = $2, updated_at = now() WHERE id = $3")
        .bind(error)
        .bind(error_stack)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to set job error")?;
    Ok(())
}

/// Pipeline-owned fields: `currentTask`, `progress`, `metadata`. Updating
/// these never changes `status`, so it carries no optimistic lock — only the
/// Orchestrator writes `status`/`startedAt`/`completedAt` (see module docs).
pub async fn update_job_progress(
    pool: &PgPool,
    id: Uuid,
    current_task: Option<&str>,
    progress: i32,
    metadata: &serde_json::Value,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE index_jobs \
         SET current_task = $1, progress = $2, metadata = $3, updated_at = now() \
         WHERE id = $4",
    )
    .bind(current_task)
    .bind(progress)
    .bind(metadata)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update job progress")?;

    if result.rows_affected() == 0 {
        bail!("job {id} not found while updating progress");
    }
    Ok(())
}

/// Restart recovery: any job still marked RUNNING when the process starts
/// was orphaned by a prior crash. Reset to FAILED so it doesn't appear
/// perpetually in-flight.
pub async fn reset_orphaned_jobs(pool: &PgPool) -> Result<Vec<Job>> {
    sqlx::query_as::<_, Job>(
        "UPDATE index_jobs \
         SET status = 'failed', \
             error = 'orphaned by orchestrator restart', \
             completed_at = now(), \
             updated_at = now() \
         WHERE status = 'running' \
         RETURNING *",
    )
    .fetch_all(pool)
    .await
    .context("failed to reset orphaned jobs")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobCounts {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

pub async fn count_jobs_by_status(pool: &PgPool) -> Result<JobCounts> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status::text, COUNT(*) FROM index_jobs GROUP BY status",
    )
    .fetch_all(pool)
    .await
    .context("failed to count jobs by status")?;

    let mut counts = JobCounts::default();
    for (status, count) in rows {
        match status.as_str() {
            "pending" => counts.pending = count,
            "running" => counts.running = count,
            "completed" => counts.completed = count,
            "failed" => counts.failed = count,
            "cancelled" => counts.cancelled = count,
            _ => {}
        }
    }
    Ok(counts)
}
