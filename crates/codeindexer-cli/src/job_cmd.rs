//! `codeindexer job ...`: create, inspect, cancel, and list jobs through the
//! `JobOrchestrator`. Every subcommand is a thin translation into one
//! orchestrator call; none of them carry business logic of their own.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use codeindexer_core::collaborators::{Collaborators, PgGraphSink, RegexParser, ShellGitClient};
use codeindexer_core::config::EngineConfig;
use codeindexer_core::orchestrator::{CreateJobRequest, JobOrchestrator};
use codeindexer_db::models::{Job, JobKind, JobStatus, JobTrigger};

fn build_orchestrator(pool: PgPool, config: EngineConfig) -> JobOrchestrator {
    let collaborators = Collaborators {
        git: Arc::new(ShellGitClient::default()),
        parser: Arc::new(RegexParser),
        graph: Arc::new(PgGraphSink::new(pool.clone())),
    };
    JobOrchestrator::new(pool, config, collaborators)
}

fn print_job(job: &Job) {
    println!("Job: {} ({})", job.kind, job.id);
    println!("  project:    {}", job.project_id);
    if let Some(codebase_id) = job.codebase_id {
        println!("  codebase:   {codebase_id}");
    }
    println!("  status:     {}", job.status);
    println!("  priority:   {}", job.priority);
    println!("  progress:   {}%", job.progress);
    if let Some(task) = &job.current_task {
        println!("  current:    {task}");
    }
    if let Some(error) = &job.error {
        println!("  error:      {error}");
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run_create(
    pool: &PgPool,
    config: EngineConfig,
    project_id: &str,
    codebase_id: Option<&str>,
    kind: &str,
    base_commit: Option<&str>,
    priority: i32,
    description: Option<&str>,
    wait_for_terminal: bool,
) -> Result<()> {
    let project_id = Uuid::parse_str(project_id).with_context(|| format!("invalid project ID: {project_id}"))?;
    let codebase_id = codebase_id
        .map(Uuid::parse_str)
        .transpose()
        .context("invalid codebase ID")?;
    let kind = JobKind::from_str(kind).with_context(|| format!("invalid job kind: {kind}"))?;

    let orchestrator = build_orchestrator(pool.clone(), config);
    let job = orchestrator
        .create_job(CreateJobRequest {
            project_id,
            codebase_id,
            kind,
            base_commit: base_commit.map(str::to_string),
            priority,
            description: description.map(str::to_string),
            trigger: JobTrigger::Manual,
        })
        .await?;

    print_job(&job);

    if wait_for_terminal {
        println!();
        println!("Waiting for job to reach a terminal state...");
        loop {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let job = orchestrator.get_job(job.id).await?;
            if job.status.is_terminal() {
                println!();
                print_job(&job);
                break;
            }
        }
    }

    Ok(())
}

pub async fn run_get(pool: &PgPool, config: EngineConfig, id: &str) -> Result<()> {
    let id = Uuid::parse_str(id).with_context(|| format!("invalid job ID: {id}"))?;
    let orchestrator = build_orchestrator(pool.clone(), config);
    let job = orchestrator.get_job(id).await?;
    print_job(&job);
    Ok(())
}

pub async fn run_cancel(pool: &PgPool, config: EngineConfig, id: &str) -> Result<()> {
    let id = Uuid::parse_str(id).with_context(|| format!("invalid job ID: {id}"))?;
    let orchestrator = build_orchestrator(pool.clone(), config);
    let job = orchestrator.cancel_job(id).await?;
    print_job(&job);
    Ok(())
}

pub async fn run_list_for_codebase(pool: &PgPool, config: EngineConfig, codebase_id: &str) -> Result<()> {
    let codebase_id = Uuid::parse_str(codebase_id).with_context(|| format!("invalid codebase ID: {codebase_id}"))?;
    let orchestrator = build_orchestrator(pool.clone(), config);
    let jobs = orchestrator.list_jobs_for_codebase(codebase_id).await?;

    println!("Active ({}):", jobs.active.len());
    for job in &jobs.active {
        println!(
            "  [{}] {} {} ({}%)",
            status_icon(job.status),
            job.id,
            job.kind,
            job.progress
        );
    }
    println!("Recent ({}):", jobs.recent.len());
    for job in &jobs.recent {
        println!("  [{}] {} {}", status_icon(job.status), job.id, job.kind);
    }
    Ok(())
}

fn status_icon(status: JobStatus) -> char {
    match status {
        JobStatus::Pending => '.',
        JobStatus::Running => '*',
        JobStatus::Completed => '+',
        JobStatus::Failed => '!',
        JobStatus::Cancelled => 'x',
    }
}
