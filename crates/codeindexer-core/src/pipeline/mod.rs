//! JobPipeline: runs one job's task list to completion.
//!
//! Tasks execute strictly sequentially; there is no intra-job concurrency.
//! The pipeline owns `currentTask`/`progress`/`metadata` writes, the
//! orchestrator owns `status`/`startedAt`/`completedAt` via
//! [`crate::state::JobStateMachine`].

use sqlx::PgPool;

use codeindexer_db::models::{
    Job, JobCounters, JobKind, JobMetadata, JobStatus, TaskStatus, TaskTrace,
};
use codeindexer_db::queries::jobs as job_db;

use crate::context::JobContext;
use crate::error::{EngineError, Result};
use crate::state::JobStateMachine;
use crate::task::{run_with_template, Task, TaskOutcome};

/// Build the ordered task list for a job kind, wiring each task to its
/// collaborator. Grounded on SPEC_FULL §4.3's task-order table.
pub fn tasks_for_kind(kind: JobKind, collaborators: &crate::collaborators::Collaborators) -> Vec<Box<dyn Task>> {
    use crate::task::api_analyze::ApiAnalyzeTask;
    use crate::task::api_discover::ApiDiscoverTask;
    use crate::task::cleanup::CleanupTask;
    use crate::task::code_parse::CodeParseTask;
    use crate::task::doc_process::DocProcessTask;
    use crate::task::doc_sync::DocSyncTask;
    use crate::task::flow_analyze::FlowAnalyzeTask;
    use crate::task::flow_discover::FlowDiscoverTask;
    use crate::task::git_sync::GitSyncTask;
    use crate::task::graph_update::GraphUpdateTask;

    match kind {
        JobKind::CodebaseFull | JobKind::CodebaseIncr => vec![
            Box::new(GitSyncTask::new(collaborators.git.clone())),
            Box::new(CodeParseTask::new(collaborators.parser.clone())),
            Box::new(GraphUpdateTask::new(collaborators.graph.clone())),
            Box::new(CleanupTask),
        ],
        JobKind::DocsFull | JobKind::DocsIncr => vec![
            Box::new(DocSyncTask),
            Box::new(DocProcessTask),
            Box::new(GraphUpdateTask::new(collaborators.graph.clone())),
            Box::new(CleanupTask),
        ],
        JobKind::ApiAnalysis => vec![
            Box::new(ApiDiscoverTask),
            Box::new(ApiAnalyzeTask),
            Box::new(GraphUpdateTask::new(collaborators.graph.clone())),
            Box::new(CleanupTask),
        ],
        JobKind::UserflowAnalysis => vec![
            Box::new(FlowDiscoverTask),
            Box::new(FlowAnalyzeTask),
            Box::new(GraphUpdateTask::new(collaborators.graph.clone())),
            Box::new(CleanupTask),
        ],
    }
}

/// Outcome of running a job's pipeline to its terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    Failed { error: String },
    Cancelled,
}

/// Run `job`'s task list against `ctx`, persisting `currentTask`/`progress`
/// and a per-task trace as it goes, per SPEC_FULL §4.3's algorithm.
pub async fn run(pool: &PgPool, job: &Job, ctx: &JobContext, tasks: Vec<Box<dyn Task>>) -> Result<PipelineOutcome> {
    JobStateMachine::transition(pool, job.id, JobStatus::Pending, JobStatus::Running)
        .await
        .map_err(EngineError::PersistenceError)?;

    ctx.prepare_dirs().map_err(|e| EngineError::PersistenceError(e.into()))?;

    let total = tasks.len();
    let mut metadata = job.metadata_typed();
    let mut first_failure: Option<String> = None;
    let mut cancelled = false;

    for (idx, task) in tasks.iter().enumerate() {
        if !cancelled && first_failure.is_none() && ctx.is_cancelled() {
            cancelled = true;
        }
        if (cancelled || first_failure.is_some()) && task.name() != "cleanup" {
            // A prior task failed, or cancellation was observed: stop starting
            // new tasks, but Cleanup (present in every pipeline's final slot)
            // still runs.
            continue;
        }

        let progress = (100 * idx / total.max(1)) as i32;
        persist_progress(pool, job.id, Some(task.name()), progress, &metadata).await?;

        let timeout = crate::timeout_policy::JobTimeoutPolicy::new(&ctx.config).timeout_for(ctx.kind);
        let started_at = chrono::Utc::now();
        let outcome = run_with_template(task.as_ref(), ctx, timeout).await;
        let completed_at = chrono::Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds();

        let trace = match &outcome {
            TaskOutcome::Completed => TaskTrace {
                status: TaskStatus::Completed,
                started_at: Some(started_at),
                completed_at: Some(completed_at),
                duration_ms: Some(duration_ms),
                error: None,
                progress: Some(100),
            },
            TaskOutcome::Skipped => TaskTrace {
                status: TaskStatus::Skipped,
                started_at: Some(started_at),
                completed_at: Some(completed_at),
                duration_ms: Some(duration_ms),
                error: None,
                progress: None,
            },
            TaskOutcome::Failed(e) => {
                first_failure = Some(e.to_string());
                TaskTrace {
                    status: TaskStatus::Failed,
                    started_at: Some(started_at),
                    completed_at: Some(completed_at),
                    duration_ms: Some(duration_ms),
                    error: Some(e.to_string()),
                    progress: None,
                }
            }
        };
        metadata.tasks.insert(task.name().to_string(), trace);
    }

    fold_metrics(&mut metadata, ctx);
    let final_progress = if first_failure.is_none() && !cancelled { 100 } else { job.progress };
    persist_progress(pool, job.id, None, final_progress, &metadata).await?;

    if cancelled {
        JobStateMachine::transition(pool, job.id, JobStatus::Running, JobStatus::Cancelled)
            .await
            .map_err(EngineError::PersistenceError)?;
        return Ok(PipelineOutcome::Cancelled);
    }

    if let Some(error) = first_failure {
        job_db::set_job_error(pool, job.id, &error, None)
            .await
            .map_err(EngineError::PersistenceError)?;
        JobStateMachine::transition(pool, job.id, JobStatus::Running, JobStatus::Failed)
            .await
            .map_err(EngineError::PersistenceError)?;
        return Ok(PipelineOutcome::Failed { error });
    }

    JobStateMachine::transition(pool, job.id, JobStatus::Running, JobStatus::Completed)
        .await
        .map_err(EngineError::PersistenceError)?;
    Ok(PipelineOutcome::Completed)
}

/// Persists `currentTask`/`progress`/`metadata`, retrying once on failure.
/// A second failure aborts the job into FAILED with `PERSISTENCE_ERROR`
/// before returning, so the job's row never sits stuck mid-pipeline.
async fn persist_progress(
    pool: &PgPool,
    job_id: uuid::Uuid,
    current_task: Option<&str>,
    progress: i32,
    metadata: &JobMetadata,
) -> Result<()> {
    let value = serde_json::to_value(metadata).map_err(|e| EngineError::PersistenceError(e.into()))?;

    let mut result = job_db::update_job_progress(pool, job_id, current_task, progress, &value).await;
    if let Err(e) = &result {
        tracing::warn!(job_id = %job_id, error = %e, "persist_progress failed, retrying once");
        result = job_db::update_job_progress(pool, job_id, current_task, progress, &value).await;
    }

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "persist_progress failed twice, aborting job");
            let _ = job_db::set_job_error(pool, job_id, "persistence failure while updating job progress", None).await;
            let _ = JobStateMachine::transition(pool, job_id, JobStatus::Running, JobStatus::Failed).await;
            Err(EngineError::PersistenceError(e))
        }
    }
}

fn fold_metrics(metadata: &mut JobMetadata, ctx: &JobContext) {
    let metrics = ctx.metrics.lock().unwrap();
    metadata.counters = JobCounters {
        files_processed: metrics.files_processed,
        symbols_extracted: metrics.symbols_extracted,
        lines_of_code: metrics.lines_of_code,
    };
    metadata.per_language = metrics.per_language.clone();
    metadata.warnings = metrics.warnings.clone();
}
