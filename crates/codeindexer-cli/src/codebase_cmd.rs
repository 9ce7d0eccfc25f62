//! `codeindexer codebase create`: minimal fixture command, see `project_cmd`.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use codeindexer_db::queries::codebases as codebase_db;

pub async fn run_create(pool: &PgPool, project_id: &str, remote_url: &str, branch: &str) -> Result<()> {
    let project_id = Uuid::parse_str(project_id).with_context(|| format!("invalid project ID: {project_id}"))?;
    let codebase = codebase_db::insert_codebase(pool, project_id, remote_url, branch).await?;
    println!("Codebase created: {} ({})", codebase.remote_url, codebase.id);
    Ok(())
}
