//! Per-job execution context: the scratch area a pipeline and its tasks
//! share for the lifetime of one RUNNING job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use codeindexer_db::models::{Codebase, Job, JobKind, Project};

use crate::config::EngineConfig;

/// Wall-clock metrics accumulated while a job runs.
#[derive(Debug, Default)]
pub struct JobMetrics {
    pub task_started_at: HashMap<String, DateTime<Utc>>,
    pub task_duration_ms: HashMap<String, i64>,
    pub files_processed: i64,
    pub symbols_extracted: i64,
    pub lines_of_code: i64,
    pub per_language: HashMap<String, i64>,
    pub warnings: Vec<String>,
}

/// Scratch area shared by every task in one job's pipeline run.
///
/// `data` is the only field tasks write directly: each task writes exactly
/// the entry named after itself, on success, and never touches another
/// task's entry. `metrics` is pipeline-owned bookkeeping folded into
/// `Job.metadata` between tasks.
pub struct JobContext {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub base_commit: Option<String>,
    pub project: Project,
    pub codebase: Option<Codebase>,
    pub config: EngineConfig,

    pub working_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub codebase_storage_path: PathBuf,

    pub data: Mutex<HashMap<String, Value>>,
    pub metrics: Mutex<JobMetrics>,
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn new(job: &Job, project: Project, codebase: Option<Codebase>, config: EngineConfig) -> Self {
        let working_dir = std::env::temp_dir()
            .join("indexer")
            .join("jobs")
            .join(job.id.to_string());
        let temp_dir = working_dir.join("temp");
        let codebase_storage_path = match &codebase {
            Some(cb) => config.storage_root.join("codebases").join(cb.id.to_string()),
            None => config.storage_root.join("project").join(project.id.to_string()),
        };

        Self {
            job_id: job.id,
            kind: job.kind,
            base_commit: job.base_commit.clone(),
            project,
            codebase,
            config,
            working_dir,
            temp_dir,
            codebase_storage_path,
            data: Mutex::new(HashMap::new()),
            metrics: Mutex::new(JobMetrics::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Create `working_dir`/`temp_dir` on disk. Idempotent.
    pub fn prepare_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.working_dir)?;
        std::fs::create_dir_all(&self.temp_dir)?;
        std::fs::create_dir_all(&self.codebase_storage_path)
    }

    pub fn put(&self, task_name: &str, value: Value) {
        self.data.lock().unwrap().insert(task_name.to_string(), value);
    }

    pub fn get(&self, task_name: &str) -> Option<Value> {
        self.data.lock().unwrap().get(task_name).cloned()
    }

    pub fn has(&self, task_name: &str) -> bool {
        self.data.lock().unwrap().contains_key(task_name)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
