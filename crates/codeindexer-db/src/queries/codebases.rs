//! Queries against the `codebases` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Codebase;

pub async fn insert_codebase(
    pool: &PgPool,
    project_id: Uuid,
    remote_url: &str,
    branch: &str,
) -> Result<Codebase> {
    sqlx::query_as::<_, Codebase>(
        "INSERT INTO codebases (project_id, remote_url, branch) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(project_id)
    .bind(remote_url)
    .bind(branch)
    .fetch_one(pool)
    .await
    .context("failed to insert codebase")
}

pub async fn get_codebase(pool: &PgPool, id: Uuid) -> Result<Option<Codebase>> {
    sqlx::query_as::<_, Codebase>("SELECT * FROM codebases WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch codebase")
}

/// Fetch a codebase and verify it belongs to the given project.
///
/// Returns `Ok(None)` both when the codebase doesn't exist and when it
/// exists but under a different project — callers that need to tell those
/// apart for error-reporting purposes should call [`get_codebase`] directly.
pub async fn get_codebase_for_project(
    pool: &PgPool,
    id: Uuid,
    project_id: Uuid,
) -> Result<Option<Codebase>> {
    sqlx::query_as::<_, Codebase>(
        "SELECT * FROM codebases WHERE id = $1 AND project_id = $2",
    )
    .bind(id)
    .bind(project_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch codebase scoped to project")
}
