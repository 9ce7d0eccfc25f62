//! Row types and domain enums persisted by the engine.
//!
//! Enums follow the same pattern throughout: a `#[sqlx(type_name = "text")]`
//! mapping to a Postgres `text` column, a hand-written `Display`/`FromStr`
//! pair (rather than deriving a crate-specific trait) so the same conversion
//! is usable outside of SQL contexts, and a dedicated `*ParseError` type
//! naming the offending string.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    CodebaseFull,
    CodebaseIncr,
    DocsFull,
    DocsIncr,
    ApiAnalysis,
    UserflowAnalysis,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::CodebaseFull => "codebase_full",
            JobKind::CodebaseIncr => "codebase_incr",
            JobKind::DocsFull => "docs_full",
            JobKind::DocsIncr => "docs_incr",
            JobKind::ApiAnalysis => "api_analysis",
            JobKind::UserflowAnalysis => "userflow_analysis",
        };
        f.write_str(s)
    }
}

impl FromStr for JobKind {
    type Err = JobKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "codebase_full" => Ok(JobKind::CodebaseFull),
            "codebase_incr" => Ok(JobKind::CodebaseIncr),
            "docs_full" => Ok(JobKind::DocsFull),
            "docs_incr" => Ok(JobKind::DocsIncr),
            "api_analysis" => Ok(JobKind::ApiAnalysis),
            "userflow_analysis" => Ok(JobKind::UserflowAnalysis),
            other => Err(JobKindParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKindParseError(pub String);

impl fmt::Display for JobKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job kind: {:?}", self.0)
    }
}

impl std::error::Error for JobKindParseError {}

impl JobKind {
    /// Whether this kind requires a `codebaseId` bound to the project.
    pub fn requires_codebase(&self) -> bool {
        matches!(self, JobKind::CodebaseFull | JobKind::CodebaseIncr)
    }

    /// Whether this kind requires a `baseCommit`.
    pub fn requires_base_commit(&self) -> bool {
        matches!(self, JobKind::CodebaseIncr)
    }
}

// ---------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(JobStatusParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusParseError(pub String);

impl fmt::Display for JobStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job status: {:?}", self.0)
    }
}

impl std::error::Error for JobStatusParseError {}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

// ---------------------------------------------------------------------
// JobTrigger
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobTrigger {
    Manual,
    Webhook,
    Scheduled,
}

impl fmt::Display for JobTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobTrigger::Manual => "manual",
            JobTrigger::Webhook => "webhook",
            JobTrigger::Scheduled => "scheduled",
        };
        f.write_str(s)
    }
}

impl FromStr for JobTrigger {
    type Err = JobTriggerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(JobTrigger::Manual),
            "webhook" => Ok(JobTrigger::Webhook),
            "scheduled" => Ok(JobTrigger::Scheduled),
            other => Err(JobTriggerParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTriggerParseError(pub String);

impl fmt::Display for JobTriggerParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job trigger: {:?}", self.0)
    }
}

impl std::error::Error for JobTriggerParseError {}

// ---------------------------------------------------------------------
// TaskStatus (lives inside the job's JSON metadata, not its own column)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "skipped" => Ok(TaskStatus::Skipped),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Codebase {
    pub id: Uuid,
    pub project_id: Uuid,
    pub remote_url: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single task's recorded trace within a job's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTrace {
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub progress: Option<i32>,
}

impl TaskTrace {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error: None,
            progress: None,
        }
    }
}

/// Aggregate counters accumulated across a job's tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobCounters {
    pub files_processed: i64,
    pub symbols_extracted: i64,
    pub lines_of_code: i64,
}

/// The free-form-in-spirit, strongly-typed-in-practice `metadata` column.
///
/// Serialized to/from `jsonb` at the repository boundary only; every other
/// layer works with this typed struct directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetadata {
    pub tasks: HashMap<String, TaskTrace>,
    pub counters: JobCounters,
    pub per_language: HashMap<String, i64>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// The `index_jobs` row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub project_id: Uuid,
    pub codebase_id: Option<Uuid>,
    pub kind: JobKind,
    pub status: JobStatus,
    pub priority: i32,
    pub trigger: JobTrigger,
    pub base_commit: Option<String>,
    pub description: Option<String>,
    pub current_task: Option<String>,
    pub progress: i32,
    pub retry_count: i32,
    pub error: Option<String>,
    pub error_stack: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Deserialize the `metadata` jsonb column into the typed view.
    ///
    /// Falls back to an empty `JobMetadata` if the column is `null` or fails
    /// to parse against the current shape (e.g. a row written before a field
    /// was added).
    pub fn metadata_typed(&self) -> JobMetadata {
        serde_json::from_value(self.metadata.clone()).unwrap_or_default()
    }
}
