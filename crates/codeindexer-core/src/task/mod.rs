//! `Task` contract: the template every pipeline step satisfies, plus the
//! concrete tasks run for each job kind.

pub mod api_discover;
pub mod api_analyze;
pub mod cleanup;
pub mod code_parse;
pub mod doc_process;
pub mod doc_sync;
pub mod flow_analyze;
pub mod flow_discover;
pub mod git_sync;
pub mod graph_update;

use std::time::Duration;

use async_trait::async_trait;

use crate::context::JobContext;
use crate::error::{EngineError, Result};

/// Outcome of one task's `execute`, before the pipeline folds it into a
/// `TaskTrace`. Failures are value-returning, never a propagated panic: the
/// template layer converts anything that would otherwise unwind into this
/// shape.
pub enum TaskOutcome {
    Completed,
    Skipped,
    Failed(EngineError),
}

/// A pipeline step. `name` must be stable — it is the key used both for
/// `JobContext.data` and for `metadata.tasks` trace entries.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    /// Other tasks whose `data` entry this task reads.
    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether this task should run at all for the given job context.
    /// Tasks that are always relevant (e.g. Cleanup) return `true`.
    async fn should_run(&self, ctx: &JobContext) -> bool {
        let _ = ctx;
        true
    }

    /// Checks that every `requires()` entry is present in `ctx.data`.
    fn validate(&self, ctx: &JobContext) -> Result<()> {
        for dep in self.requires() {
            if !ctx.has(dep) {
                return Err(EngineError::InvalidRequest(format!(
                    "task '{}' requires data from '{}', which has not been written",
                    self.name(),
                    dep
                )));
            }
        }
        Ok(())
    }

    /// Run the task's work. On success, the template writes the returned
    /// value into `ctx.data[self.name()]`.
    async fn execute(&self, ctx: &JobContext) -> Result<serde_json::Value>;

    /// Always invoked after `execute`, win or lose. Errors here are demoted
    /// to warnings on the job and never change the task's outcome.
    async fn cleanup(&self, ctx: &JobContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// A rough estimate used only for operator-facing reporting; not load
    /// bearing for scheduling or timeouts.
    fn estimate_duration_ms(&self) -> u64 {
        1_000
    }
}

/// Run `task` through the standard template: validate, execute under a
/// timeout, always cleanup. Never propagates a Rust error out of this
/// function — any failure surfaces as `TaskOutcome::Failed`.
pub async fn run_with_template(
    task: &dyn Task,
    ctx: &JobContext,
    timeout: Duration,
) -> TaskOutcome {
    if !task.should_run(ctx).await {
        return TaskOutcome::Skipped;
    }

    let outcome = if let Err(e) = task.validate(ctx) {
        TaskOutcome::Failed(e)
    } else {
        match tokio::time::timeout(timeout, task.execute(ctx)).await {
            Ok(Ok(value)) => {
                ctx.put(task.name(), value);
                TaskOutcome::Completed
            }
            Ok(Err(e)) => TaskOutcome::Failed(e),
            Err(_) => TaskOutcome::Failed(EngineError::Timeout {
                task: task.name().to_string(),
                elapsed_ms: timeout.as_millis() as u64,
            }),
        }
    };

    if let Err(e) = task.cleanup(ctx).await {
        ctx.metrics
            .lock()
            .unwrap()
            .warnings
            .push(format!("cleanup warning in '{}': {e}", task.name()));
    }

    outcome
}
