//! Queries against the `projects` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Project;

pub async fn insert_project(pool: &PgPool, name: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>(
        "INSERT INTO projects (name) VALUES ($1) RETURNING *",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .context("failed to insert project")
}

pub async fn get_project(pool: &PgPool, id: Uuid) -> Result<Option<Project>> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch project")
}
