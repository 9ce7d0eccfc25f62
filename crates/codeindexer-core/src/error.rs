//! The structured error taxonomy for the engine's public boundary.
//!
//! Internal plumbing (filesystem, process spawning, SQL access) propagates
//! `anyhow::Result`; once an error reaches `JobOrchestrator` or a collaborator
//! contract it is translated into one of these tagged variants so callers can
//! match exhaustively instead of inspecting strings.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("codebase {0} not found")]
    CodebaseNotFound(Uuid),

    #[error("codebase {codebase_id} does not belong to project {project_id}")]
    CodebaseProjectMismatch {
        codebase_id: Uuid,
        project_id: Uuid,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: Uuid,
        from: String,
        to: String,
    },

    #[error("codebase {0} already has an active job")]
    ConcurrentCodebaseJob(Uuid),

    #[error("worker pool at capacity")]
    CapacityExceeded,

    #[error("task {task} timed out after {elapsed_ms}ms")]
    Timeout { task: String, elapsed_ms: u64 },

    #[error("task {task} panicked: {message}")]
    TaskPanicked { task: String, message: String },

    #[error("git operation failed")]
    GitError(#[source] anyhow::Error),

    #[error("parse operation failed")]
    ParseError(#[source] anyhow::Error),

    #[error("graph write failed")]
    GraphError(#[source] anyhow::Error),

    #[error("persistence failed")]
    PersistenceError(#[source] anyhow::Error),

    #[error("job {0} cancelled")]
    Cancelled(Uuid),
}

impl EngineError {
    /// The stable tag used in logs and at the CLI boundary; matches the
    /// kind names used throughout the design (`JOB_NOT_FOUND`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            Self::CodebaseNotFound(_) => "CODEBASE_NOT_FOUND",
            Self::CodebaseProjectMismatch { .. } => "CODEBASE_PROJECT_MISMATCH",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::ConcurrentCodebaseJob(_) => "CONCURRENT_CODEBASE_JOB",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::TaskPanicked { .. } => "TASK_PANIC",
            Self::GitError(_) => "GIT_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::GraphError(_) => "GRAPH_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::Cancelled(_) => "CANCELLED",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
