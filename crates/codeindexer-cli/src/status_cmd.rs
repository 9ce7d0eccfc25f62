//! `codeindexer system status`: pool utilization plus job counts by status.

use anyhow::Result;
use sqlx::PgPool;

use codeindexer_core::collaborators::{Collaborators, PgGraphSink, RegexParser, ShellGitClient};
use codeindexer_core::config::EngineConfig;
use codeindexer_core::orchestrator::JobOrchestrator;
use codeindexer_db::queries::jobs as job_db;
use std::sync::Arc;

pub async fn run_status(pool: &PgPool, config: EngineConfig) -> Result<()> {
    let collaborators = Collaborators {
        git: Arc::new(ShellGitClient::default()),
        parser: Arc::new(RegexParser),
        graph: Arc::new(PgGraphSink::new(pool.clone())),
    };
    let orchestrator = JobOrchestrator::new(pool.clone(), config, collaborators);
    orchestrator.recover_orphaned_jobs().await?;

    let status = orchestrator.system_status().await;
    println!("Pool: {}", status.pool_health);
    println!(
        "  running:     {} (utilization {:.0}%)",
        status.running_jobs,
        status.utilization * 100.0
    );
    println!("  uptime:      {}s", status.uptime_secs);
    if !status.active_ids.is_empty() {
        println!("  active ids:");
        for id in &status.active_ids {
            println!("    {id}");
        }
    }

    let counts = job_db::count_jobs_by_status(pool).await?;
    println!("Jobs:");
    println!(
        "  pending={} running={} completed={} failed={} cancelled={}",
        counts.pending, counts.running, counts.completed, counts.failed, counts.cancelled
    );

    Ok(())
}
