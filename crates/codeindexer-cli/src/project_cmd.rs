//! `codeindexer project create`: minimal fixture command so a codebase (and
//! then a job) can be created without a separate HTTP layer.

use anyhow::Result;
use sqlx::PgPool;

use codeindexer_db::queries::projects as project_db;

pub async fn run_create(pool: &PgPool, name: &str) -> Result<()> {
    let project = project_db::insert_project(pool, name).await?;
    println!("Project created: {} ({})", project.name, project.id);
    Ok(())
}
