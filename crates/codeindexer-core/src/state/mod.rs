//! Job state machine transitions.
//!
//! Validates and executes state transitions for jobs, enforcing the allowed
//! transition graph and optimistic locking against the persisted row.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use codeindexer_db::models::JobStatus;
use codeindexer_db::queries::jobs as db;

/// The job state machine.
///
/// Enforces the valid transition graph:
///
/// ```text
/// pending   -> running
/// pending   -> cancelled
/// running   -> completed
/// running   -> failed
/// running   -> cancelled
/// ```
pub struct JobStateMachine;

impl JobStateMachine {
    pub fn is_valid_transition(from: JobStatus, to: JobStatus) -> bool {
        matches!(
            (from, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    /// Execute a state transition with optimistic locking.
    ///
    /// - Validates the transition is legal.
    /// - Sets `started_at` on `pending -> running`.
    /// - Sets `completed_at` on any transition into a terminal status.
    ///
    /// Returns an error if the transition is illegal, the job does not
    /// exist, or another writer already moved the row's status
    /// (optimistic lock failure).
    pub async fn transition(pool: &PgPool, job_id: Uuid, from: JobStatus, to: JobStatus) -> Result<()> {
        if !Self::is_valid_transition(from, to) {
            bail!("invalid state transition: {} -> {} for job {}", from, to, job_id);
        }

        let started_at = if from == JobStatus::Pending && to == JobStatus::Running {
            Some(Utc::now())
        } else {
            None
        };

        let completed_at = if to.is_terminal() { Some(Utc::now()) } else { None };

        let rows = db::transition_job_status(pool, job_id, from, to, started_at, completed_at)
            .await
            .with_context(|| format!("failed to transition job {job_id} from {from} to {to}"))?;

        if rows == 0 {
            let job = db::get_job(pool, job_id).await?;
            match job {
                None => bail!("job {job_id} not found"),
                Some(j) => bail!(
                    "optimistic lock failed: job {job_id} has status {}, expected {from}",
                    j.status
                ),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(JobStateMachine::is_valid_transition(
            JobStatus::Pending,
            JobStatus::Running
        ));
        assert!(JobStateMachine::is_valid_transition(
            JobStatus::Pending,
            JobStatus::Cancelled
        ));
        assert!(JobStateMachine::is_valid_transition(
            JobStatus::Running,
            JobStatus::Completed
        ));
        assert!(JobStateMachine::is_valid_transition(
            JobStatus::Running,
            JobStatus::Failed
        ));
        assert!(JobStateMachine::is_valid_transition(
            JobStatus::Running,
            JobStatus::Cancelled
        ));
    }

    #[test]
    fn invalid_transitions() {
        assert!(!JobStateMachine::is_valid_transition(
            JobStatus::Completed,
            JobStatus::Running
        ));
        assert!(!JobStateMachine::is_valid_transition(
            JobStatus::Pending,
            JobStatus::Completed
        ));
        assert!(!JobStateMachine::is_valid_transition(
            JobStatus::Cancelled,
            JobStatus::Running
        ));
        assert!(!JobStateMachine::is_valid_transition(
            JobStatus::Failed,
            JobStatus::Running
        ));
    }
}
