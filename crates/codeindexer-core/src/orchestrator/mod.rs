//! `JobOrchestrator`: the public façade. Validates and admits jobs, persists
//! every state-machine edge before any observable side effect, and hands
//! pipeline execution off to a [`WorkerPool`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use sqlx::PgPool;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use codeindexer_db::models::{Job, JobKind, JobStatus, JobTrigger};
use codeindexer_db::queries::{codebases as codebase_db, jobs as job_db, projects as project_db};

use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::context::JobContext;
use crate::error::{EngineError, Result};
use crate::pipeline::{self, tasks_for_kind, PipelineOutcome};
use crate::worker_pool::{PoolConfig, PoolTask, WorkerPool};

/// Fields accepted by `CreateJob`.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub project_id: Uuid,
    pub codebase_id: Option<Uuid>,
    pub kind: JobKind,
    pub base_commit: Option<String>,
    pub priority: i32,
    pub description: Option<String>,
    pub trigger: JobTrigger,
}

#[derive(Debug, Clone)]
pub struct JobsForCodebase {
    pub active: Vec<Job>,
    pub recent: Vec<Job>,
}

#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub running_jobs: usize,
    pub active_ids: Vec<Uuid>,
    pub utilization: f64,
    pub pool_health: &'static str,
    pub uptime_secs: u64,
}

/// Public façade over job creation, inspection, cancellation, and listing.
pub struct JobOrchestrator {
    pool: PgPool,
    config: EngineConfig,
    collaborators: Collaborators,
    worker_pool: Arc<WorkerPool>,
    running: Arc<AsyncMutex<HashMap<Uuid, CancellationToken>>>,
    started_at: Instant,
}

impl JobOrchestrator {
    pub fn new(pool: PgPool, config: EngineConfig, collaborators: Collaborators) -> Self {
        let worker_pool = WorkerPool::new(
            "jobs",
            PoolConfig {
                max_concurrent: config.jobs_max_concurrent,
                default_timeout: std::time::Duration::from_millis(config.jobs_default_timeout_ms),
            },
        );
        Self {
            pool,
            config,
            collaborators,
            worker_pool,
            running: Arc::new(AsyncMutex::new(HashMap::new())),
            started_at: Instant::now(),
        }
    }

    /// Restart recovery: reset any job left RUNNING by a prior crash.
    pub async fn recover_orphaned_jobs(&self) -> Result<usize> {
        let orphaned = job_db::reset_orphaned_jobs(&self.pool)
            .await
            .map_err(EngineError::PersistenceError)?;
        for job in &orphaned {
            tracing::warn!(job_id = %job.id, kind = %job.kind, "reset orphaned job to failed");
        }
        Ok(orphaned.len())
    }

    fn validate_request(&self, req: &CreateJobRequest) -> Result<()> {
        if req.kind.requires_codebase() && req.codebase_id.is_none() {
            return Err(EngineError::InvalidRequest(format!(
                "job kind {} requires codebaseId",
                req.kind
            )));
        }
        if req.kind.requires_base_commit() && req.base_commit.is_none() {
            return Err(EngineError::InvalidRequest(format!(
                "job kind {} requires baseCommit",
                req.kind
            )));
        }
        Ok(())
    }

    pub async fn create_job(&self, req: CreateJobRequest) -> Result<Job> {
        self.validate_request(&req)?;

        let project = project_db::get_project(&self.pool, req.project_id)
            .await
            .map_err(EngineError::PersistenceError)?
            .ok_or(EngineError::ProjectNotFound(req.project_id))?;

        let codebase = if let Some(codebase_id) = req.codebase_id {
            let codebase = codebase_db::get_codebase(&self.pool, codebase_id)
                .await
                .map_err(EngineError::PersistenceError)?
                .ok_or(EngineError::CodebaseNotFound(codebase_id))?;
            if codebase.project_id != project.id {
                return Err(EngineError::CodebaseProjectMismatch {
                    codebase_id,
                    project_id: project.id,
                });
            }
            Some(codebase)
        } else {
            None
        };

        if let Some(codebase) = &codebase
            && job_db::has_active_job_for_codebase(&self.pool, codebase.id)
                .await
                .map_err(EngineError::PersistenceError)?
        {
            return Err(EngineError::ConcurrentCodebaseJob(codebase.id));
        }

        let job = job_db::insert_job(
            &self.pool,
            project.id,
            codebase.as_ref().map(|c| c.id),
            req.kind,
            req.priority,
            req.trigger,
            req.base_commit.as_deref(),
            req.description.as_deref(),
        )
        .await
        .map_err(EngineError::PersistenceError)?;

        self.submit(job.clone(), project, codebase).await?;
        Ok(job)
    }

    async fn submit(
        &self,
        job: Job,
        project: codeindexer_db::models::Project,
        codebase: Option<codeindexer_db::models::Codebase>,
    ) -> Result<()> {
        let ctx = JobContext::new(&job, project, codebase, self.config.clone());
        let cancel = ctx.cancel.clone();
        self.running.lock().await.insert(job.id, cancel);

        let pool = self.pool.clone();
        let collaborators = self.collaborators.clone();
        let running = Arc::clone(&self.running);
        let job_id = job.id;
        let job_for_run = job.clone();
        let timeout = self.config.timeout_for(job.kind);

        let body = Box::pin(async move {
            let tasks = tasks_for_kind(job_for_run.kind, &collaborators);
            let outcome = pipeline::run(&pool, &job_for_run, &ctx, tasks).await;
            running.lock().await.remove(&job_id);
            match outcome {
                Ok(PipelineOutcome::Completed)
                | Ok(PipelineOutcome::Cancelled)
                | Ok(PipelineOutcome::Failed { .. }) => Ok(()),
                Err(e) => Err(e),
            }
        });

        let handle = self
            .worker_pool
            .submit(PoolTask {
                id: job_id,
                priority: job.priority,
                timeout: Some(timeout),
                body,
            })
            .await;

        tokio::spawn(async move {
            if let Err(e) = handle.await
                && !matches!(e, EngineError::Cancelled(_))
            {
                tracing::error!(job_id = %job_id, error = %e, "job pipeline execution failed at the orchestration layer");
            }
        });

        Ok(())
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job> {
        job_db::get_job(&self.pool, id)
            .await
            .map_err(EngineError::PersistenceError)?
            .ok_or(EngineError::JobNotFound(id))
    }

    pub async fn cancel_job(&self, id: Uuid) -> Result<Job> {
        let job = self.get_job(id).await?;

        match job.status {
            JobStatus::Pending => {
                if self.worker_pool.cancel_queued(id).await {
                    let rows = job_db::transition_job_status(
                        &self.pool,
                        id,
                        JobStatus::Pending,
                        JobStatus::Cancelled,
                        None,
                        Some(chrono::Utc::now()),
                    )
                    .await
                    .map_err(EngineError::PersistenceError)?;
                    if rows == 0 {
                        // Lost the race with the dispatcher; it is now running.
                        return self.cancel_running(id).await;
                    }
                    self.running.lock().await.remove(&id);
                    self.get_job(id).await
                } else {
                    self.cancel_running(id).await
                }
            }
            JobStatus::Running => self.cancel_running(id).await,
            _ => Err(EngineError::IllegalTransition {
                job_id: id,
                from: job.status.to_string(),
                to: "cancelled".to_string(),
            }),
        }
    }

    async fn cancel_running(&self, id: Uuid) -> Result<Job> {
        let running = self.running.lock().await;
        match running.get(&id) {
            Some(token) => {
                token.cancel();
                drop(running);
                self.get_job(id).await
            }
            None => {
                drop(running);
                let job = self.get_job(id).await?;
                if job.status.is_terminal() {
                    Ok(job)
                } else {
                    Err(EngineError::IllegalTransition {
                        job_id: id,
                        from: job.status.to_string(),
                        to: "cancelled".to_string(),
                    })
                }
            }
        }
    }

    pub async fn list_jobs_for_codebase(&self, codebase_id: Uuid) -> Result<JobsForCodebase> {
        let active = job_db::find_active_for_codebase(&self.pool, codebase_id)
            .await
            .map_err(EngineError::PersistenceError)?;
        let recent = job_db::find_recent_for_codebase(&self.pool, codebase_id, 20)
            .await
            .map_err(EngineError::PersistenceError)?;
        Ok(JobsForCodebase { active, recent })
    }

    pub async fn system_status(&self) -> SystemStatus {
        let running = self.running.lock().await;
        let active_ids: Vec<Uuid> = running.keys().copied().collect();
        let running_jobs = active_ids.len();
        drop(running);

        let utilization = running_jobs as f64 / self.config.jobs_max_concurrent.max(1) as f64;
        SystemStatus {
            running_jobs,
            active_ids,
            utilization,
            pool_health: "ok",
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}
