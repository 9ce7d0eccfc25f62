//! End-to-end tests for the job pipeline and `JobOrchestrator`, covering a
//! full index, an incremental index with a mixed diff, a mid-pipeline parser
//! failure, a timeout, and cancellation both while queued and while running.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use codeindexer_db::models::{Codebase, Job, JobKind, JobStatus, JobTrigger, Project};
use codeindexer_db::queries::codebases as codebase_db;
use codeindexer_db::queries::jobs as job_db;
use codeindexer_db::queries::projects as project_db;
use codeindexer_test_utils::{create_test_db, drop_test_db};

use codeindexer_core::collaborators::{
    Collaborators, DiffEntry, GitClient, GraphSink, ParseResult, Parser, PgGraphSink, RegexParser,
    ShellGitClient,
};
use codeindexer_core::config::EngineConfig;
use codeindexer_core::context::JobContext;
use codeindexer_core::orchestrator::{CreateJobRequest, JobOrchestrator};
use codeindexer_core::pipeline::{self, PipelineOutcome};

// ===========================================================================
// Test git repos
// ===========================================================================

fn run_git(repo: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {e}", args.join(" ")));
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn init_repo(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().expect("failed to create temp repo dir");
    run_git(dir.path(), &["init", "--initial-branch=main"]);
    run_git(dir.path(), &["config", "user.email", "test@codeindexer.dev"]);
    run_git(dir.path(), &["config", "user.name", "Codeindexer Test"]);
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).expect("failed to write fixture file");
    }
    run_git(dir.path(), &["add", "."]);
    run_git(dir.path(), &["commit", "-m", "initial"]);
    dir
}

fn commit_changes(repo: &Path, writes: &[(&str, &str)], removes: &[&str]) {
    for (name, contents) in writes {
        std::fs::write(repo.join(name), contents).expect("failed to write fixture file");
    }
    for name in removes {
        std::fs::remove_file(repo.join(name)).expect("failed to remove fixture file");
    }
    run_git(repo, &["add", "-A"]);
    run_git(repo, &["commit", "-m", "second"]);
}

// ===========================================================================
// Test-only collaborators
// ===========================================================================

/// Wraps `ShellGitClient` and sleeps before every clone, to make a job's
/// GitSync phase observably long-running for cancellation tests.
struct SlowCloneGitClient {
    inner: ShellGitClient,
    delay: Duration,
}

#[async_trait]
impl GitClient for SlowCloneGitClient {
    async fn is_valid_repo(&self, path: &Path) -> bool {
        self.inner.is_valid_repo(path).await
    }

    async fn clone(&self, url: &str, path: &Path, branch: &str, shallow: bool) -> anyhow::Result<String> {
        sleep(self.delay).await;
        self.inner.clone(url, path, branch, shallow).await
    }

    async fn pull(&self, path: &Path, branch: &str) -> anyhow::Result<String> {
        self.inner.pull(path, branch).await
    }

    async fn current_commit(&self, path: &Path) -> anyhow::Result<String> {
        self.inner.current_commit(path).await
    }

    async fn diff(&self, path: &Path, from_commit: &str, to_commit: &str) -> anyhow::Result<Vec<DiffEntry>> {
        self.inner.diff(path, from_commit, to_commit).await
    }

    async fn list_files(&self, path: &Path) -> anyhow::Result<Vec<String>> {
        self.inner.list_files(path).await
    }

    async fn delete_repo(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.delete_repo(path).await
    }
}

/// Wraps `RegexParser` but errors out for one specific language, to exercise
/// the mid-pipeline failure path without depending on real parser bugs.
struct FailingLanguageParser {
    fails_on: &'static str,
    inner: RegexParser,
}

#[async_trait]
impl Parser for FailingLanguageParser {
    async fn parse(&self, language: &str, repo_path: &Path, files: &[String]) -> anyhow::Result<Vec<ParseResult>> {
        if language == self.fails_on {
            anyhow::bail!("simulated parser failure for language '{language}'");
        }
        self.inner.parse(language, repo_path, files).await
    }
}

/// Wraps `RegexParser` but sleeps before returning, to push a job's CodeParse
/// phase past its deadline for the timeout scenario.
struct SlowParser {
    delay: Duration,
    inner: RegexParser,
}

#[async_trait]
impl Parser for SlowParser {
    async fn parse(&self, language: &str, repo_path: &Path, files: &[String]) -> anyhow::Result<Vec<ParseResult>> {
        sleep(self.delay).await;
        self.inner.parse(language, repo_path, files).await
    }
}

// ===========================================================================
// Test harness
// ===========================================================================

struct TestHarness {
    pool: sqlx::PgPool,
    db_name: String,
    storage_dir: tempfile::TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        let (pool, db_name) = create_test_db().await;
        let storage_dir = tempfile::TempDir::new().expect("failed to create storage root");
        Self {
            pool,
            db_name,
            storage_dir,
        }
    }

    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.storage_root = self.storage_dir.path().to_path_buf();
        config
    }

    fn graph(&self) -> Arc<dyn GraphSink> {
        Arc::new(PgGraphSink::new(self.pool.clone()))
    }

    async fn insert_project_and_codebase(&self, repo_path: &Path) -> (Project, Codebase) {
        let project = project_db::insert_project(&self.pool, "indexer-test-project")
            .await
            .expect("failed to insert project");
        let codebase = codebase_db::insert_codebase(
            &self.pool,
            project.id,
            &repo_path.to_string_lossy(),
            "main",
        )
        .await
        .expect("failed to insert codebase");
        (project, codebase)
    }

    async fn insert_job(
        &self,
        project: &Project,
        codebase: &Codebase,
        kind: JobKind,
        base_commit: Option<&str>,
    ) -> Job {
        job_db::insert_job(
            &self.pool,
            project.id,
            Some(codebase.id),
            kind,
            0,
            JobTrigger::Manual,
            base_commit,
            None,
        )
        .await
        .expect("failed to insert job")
    }

    fn orchestrator(&self, collaborators: Collaborators, max_concurrent: usize, timeout_ms: u64) -> JobOrchestrator {
        let mut config = self.config();
        config.jobs_max_concurrent = max_concurrent;
        config.jobs_default_timeout_ms = timeout_ms;
        JobOrchestrator::new(self.pool.clone(), config, collaborators)
    }

    async fn teardown(self) {
        self.pool.close().await;
        drop_test_db(&self.db_name).await;
    }
}

async fn poll_until_terminal(pool: &sqlx::PgPool, job_id: uuid::Uuid) -> Job {
    for _ in 0..200 {
        let job = job_db::get_job(pool, job_id).await.unwrap().unwrap();
        if job.status.is_terminal() {
            return job;
        }
        sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not reach a terminal state in time");
}

fn real_collaborators(pool: &sqlx::PgPool) -> Collaborators {
    Collaborators {
        git: Arc::new(ShellGitClient::default()),
        parser: Arc::new(RegexParser),
        graph: Arc::new(PgGraphSink::new(pool.clone())),
    }
}

// ===========================================================================
// Scenario: happy full codebase
// ===========================================================================

#[tokio::test]
async fn happy_full_codebase_indexes_all_files() {
    let harness = TestHarness::new().await;
    let repo = init_repo(&[
        ("a.ts", "export function a() {}\n"),
        ("b.ts", "export function b() {}\n"),
        ("c.py", "def c():\n    pass\n"),
    ]);
    let (project, codebase) = harness.insert_project_and_codebase(repo.path()).await;
    let job = harness.insert_job(&project, &codebase, JobKind::CodebaseFull, None).await;

    let ctx = JobContext::new(&job, project, Some(codebase), harness.config());
    let tasks = pipeline::tasks_for_kind(job.kind, &real_collaborators(&harness.pool));
    let outcome = pipeline::run(&harness.pool, &job, &ctx, tasks).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed);

    let final_job = job_db::get_job(&harness.pool, job.id).await.unwrap().unwrap();
    assert_eq!(final_job.status, JobStatus::Completed);
    assert_eq!(final_job.progress, 100);
    assert!(final_job.error.is_none());
    assert!(final_job.completed_at.is_some());

    let metadata = final_job.metadata_typed();
    assert_eq!(metadata.counters.files_processed, 3);
    for name in ["gitSync", "codeParsing", "graphUpdate", "cleanup"] {
        assert_eq!(
            metadata.tasks.get(name).map(|t| t.status),
            Some(codeindexer_db::models::TaskStatus::Completed),
            "{name} should be COMPLETED"
        );
    }

    let git_sync = ctx.get("gitSync").unwrap();
    let mut files_added: Vec<String> = git_sync["filesAdded"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    files_added.sort();
    assert_eq!(files_added, vec!["a.ts".to_string(), "b.ts".to_string(), "c.py".to_string()]);

    harness.teardown().await;
}

// ===========================================================================
// Scenario: incremental with mixed diff
// ===========================================================================

#[tokio::test]
async fn incremental_job_reports_mixed_diff_and_deletes_graph_state() {
    let harness = TestHarness::new().await;
    let repo = init_repo(&[
        ("a.ts", "export function a() {}\n"),
        ("b.ts", "export function b() {}\n"),
    ]);
    let (project, codebase) = harness.insert_project_and_codebase(repo.path()).await;

    // Full job first, to establish codebaseStoragePath as a valid repo that
    // the incremental job below (same codebase, so same storage path) can
    // pull against.
    let full_job = harness.insert_job(&project, &codebase, JobKind::CodebaseFull, None).await;
    let full_ctx = JobContext::new(&full_job, project.clone(), Some(codebase.clone()), harness.config());
    let full_tasks = pipeline::tasks_for_kind(full_job.kind, &real_collaborators(&harness.pool));
    let full_outcome = pipeline::run(&harness.pool, &full_job, &full_ctx, full_tasks).await.unwrap();
    assert_eq!(full_outcome, PipelineOutcome::Completed);
    let base_commit = full_ctx.get("gitSync").unwrap()["commitHash"].as_str().unwrap().to_string();

    commit_changes(
        repo.path(),
        &[("a.ts", "export function a() { return 1; }\n"), ("d.ts", "export function d() {}\n")],
        &["b.ts"],
    );

    let incr_job = harness
        .insert_job(&project, &codebase, JobKind::CodebaseIncr, Some(&base_commit))
        .await;
    let incr_ctx = JobContext::new(&incr_job, project, Some(codebase), harness.config());
    let incr_tasks = pipeline::tasks_for_kind(incr_job.kind, &real_collaborators(&harness.pool));
    let incr_outcome = pipeline::run(&harness.pool, &incr_job, &incr_ctx, incr_tasks).await.unwrap();
    assert_eq!(incr_outcome, PipelineOutcome::Completed);

    let git_sync = incr_ctx.get("gitSync").unwrap();
    assert_eq!(git_sync["filesChanged"].as_array().unwrap(), &[serde_json::json!("a.ts")]);
    assert_eq!(git_sync["filesDeleted"].as_array().unwrap(), &[serde_json::json!("b.ts")]);
    assert_eq!(git_sync["filesAdded"].as_array().unwrap(), &[serde_json::json!("d.ts")]);

    let code_parsing = incr_ctx.get("codeParsing").unwrap();
    let mut processed_paths: Vec<String> = code_parsing["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["path"].as_str().unwrap().to_string())
        .collect();
    processed_paths.sort();
    assert_eq!(processed_paths, vec!["a.ts".to_string(), "d.ts".to_string()]);

    let graph_update = incr_ctx.get("graphUpdate").unwrap();
    assert!(graph_update["nodesDeleted"].as_i64().unwrap() > 0);

    let final_job = job_db::get_job(&harness.pool, incr_job.id).await.unwrap().unwrap();
    assert_eq!(final_job.status, JobStatus::Completed);

    harness.teardown().await;
}

// ===========================================================================
// Scenario: parser failure halts the pipeline
// ===========================================================================

#[tokio::test]
async fn parser_failure_fails_job_and_skips_graph_update() {
    let harness = TestHarness::new().await;
    let repo = init_repo(&[
        ("a.ts", "export function a() {}\n"),
        ("c.py", "def c():\n    pass\n"),
    ]);
    let (project, codebase) = harness.insert_project_and_codebase(repo.path()).await;
    let job = harness.insert_job(&project, &codebase, JobKind::CodebaseFull, None).await;

    let ctx = JobContext::new(&job, project, Some(codebase), harness.config());
    let collaborators = Collaborators {
        git: Arc::new(ShellGitClient::default()),
        parser: Arc::new(FailingLanguageParser {
            fails_on: "python",
            inner: RegexParser,
        }),
        graph: harness.graph(),
    };
    let tasks = pipeline::tasks_for_kind(job.kind, &collaborators);
    let outcome = pipeline::run(&harness.pool, &job, &ctx, tasks).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Failed { .. }));

    let final_job = job_db::get_job(&harness.pool, job.id).await.unwrap().unwrap();
    assert_eq!(final_job.status, JobStatus::Failed);
    assert!(final_job.error.as_deref().unwrap().contains("parse"));

    let metadata = final_job.metadata_typed();
    assert_eq!(
        metadata.tasks["gitSync"].status,
        codeindexer_db::models::TaskStatus::Completed
    );
    assert_eq!(
        metadata.tasks["codeParsing"].status,
        codeindexer_db::models::TaskStatus::Failed
    );
    assert!(!metadata.tasks.contains_key("graphUpdate"));
    assert_eq!(
        metadata.tasks["cleanup"].status,
        codeindexer_db::models::TaskStatus::Completed
    );
    assert!(!ctx.working_dir.exists());

    harness.teardown().await;
}

// ===========================================================================
// Scenario: timeout during CodeParse
// ===========================================================================

#[tokio::test]
async fn task_timeout_fails_job_with_progress_below_complete() {
    let harness = TestHarness::new().await;
    let repo = init_repo(&[("a.rs", "pub fn a() {}\n")]);
    let (project, codebase) = harness.insert_project_and_codebase(repo.path()).await;
    let job = harness.insert_job(&project, &codebase, JobKind::CodebaseFull, None).await;

    let mut config = harness.config();
    config.jobs_default_timeout_ms = 60;
    let ctx = JobContext::new(&job, project, Some(codebase), config);
    let collaborators = Collaborators {
        git: Arc::new(ShellGitClient::default()),
        parser: Arc::new(SlowParser {
            delay: Duration::from_millis(400),
            inner: RegexParser,
        }),
        graph: harness.graph(),
    };
    let tasks = pipeline::tasks_for_kind(job.kind, &collaborators);
    let outcome = pipeline::run(&harness.pool, &job, &ctx, tasks).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Failed { .. }));

    let final_job = job_db::get_job(&harness.pool, job.id).await.unwrap().unwrap();
    assert_eq!(final_job.status, JobStatus::Failed);
    assert!(final_job.progress < 100);

    let metadata = final_job.metadata_typed();
    assert!(metadata.tasks["codeParsing"].error.as_deref().unwrap().contains("timed out"));

    harness.teardown().await;
}

// ===========================================================================
// Scenario: cancellation while queued
// ===========================================================================

#[tokio::test]
async fn cancelling_a_queued_job_leaves_no_side_effects() {
    let harness = TestHarness::new().await;
    let blocker_repo = init_repo(&[("a.rs", "pub fn a() {}\n")]);
    let (project, blocker_codebase) = harness.insert_project_and_codebase(blocker_repo.path()).await;
    let (_, queued_codebase) = harness.insert_project_and_codebase(blocker_repo.path()).await;

    let collaborators = Collaborators {
        git: Arc::new(SlowCloneGitClient {
            inner: ShellGitClient::default(),
            delay: Duration::from_millis(500),
        }),
        parser: Arc::new(RegexParser),
        graph: harness.graph(),
    };
    let orchestrator = harness.orchestrator(collaborators, 1, 30_000);

    let blocker = orchestrator
        .create_job(CreateJobRequest {
            project_id: project.id,
            codebase_id: Some(blocker_codebase.id),
            kind: JobKind::CodebaseFull,
            base_commit: None,
            priority: 0,
            description: None,
            trigger: JobTrigger::Manual,
        })
        .await
        .expect("blocker job should be admitted");

    // Give the dispatcher a moment to pick up the blocker, occupying the
    // pool's single slot before the next job is submitted.
    sleep(Duration::from_millis(30)).await;

    let queued = orchestrator
        .create_job(CreateJobRequest {
            project_id: project.id,
            codebase_id: Some(queued_codebase.id),
            kind: JobKind::CodebaseFull,
            base_commit: None,
            priority: 0,
            description: None,
            trigger: JobTrigger::Manual,
        })
        .await
        .expect("queued job should be admitted");

    let cancelled = orchestrator.cancel_job(queued.id).await.expect("cancel should succeed");
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let working_dir = std::env::temp_dir().join("indexer").join("jobs").join(queued.id.to_string());
    assert!(!working_dir.exists(), "a queued-then-cancelled job must never touch disk");

    let final_queued = job_db::get_job(&harness.pool, queued.id).await.unwrap().unwrap();
    assert!(
        final_queued.metadata_typed().tasks.is_empty(),
        "a queued-then-cancelled job must have no task traces"
    );

    poll_until_terminal(&harness.pool, blocker.id).await;
    harness.teardown().await;
}

// ===========================================================================
// Scenario: cancellation while running
// ===========================================================================

#[tokio::test]
async fn cancelling_a_running_job_still_runs_cleanup() {
    let harness = TestHarness::new().await;
    let repo = init_repo(&[("a.rs", "pub fn a() {}\n")]);
    let (project, codebase) = harness.insert_project_and_codebase(repo.path()).await;

    let collaborators = Collaborators {
        git: Arc::new(SlowCloneGitClient {
            inner: ShellGitClient::default(),
            delay: Duration::from_millis(300),
        }),
        parser: Arc::new(RegexParser),
        graph: harness.graph(),
    };
    let orchestrator = harness.orchestrator(collaborators, 2, 30_000);

    let job = orchestrator
        .create_job(CreateJobRequest {
            project_id: project.id,
            codebase_id: Some(codebase.id),
            kind: JobKind::CodebaseFull,
            base_commit: None,
            priority: 0,
            description: None,
            trigger: JobTrigger::Manual,
        })
        .await
        .expect("job should be admitted");

    // Wait until the orchestrator has transitioned it to RUNNING, then
    // cancel while GitSync's clone is still in flight.
    for _ in 0..40 {
        let current = job_db::get_job(&harness.pool, job.id).await.unwrap().unwrap();
        if current.status == JobStatus::Running {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    orchestrator.cancel_job(job.id).await.expect("cancel should succeed");

    let final_job = poll_until_terminal(&harness.pool, job.id).await;
    assert_eq!(final_job.status, JobStatus::Cancelled);
    let metadata = final_job.metadata_typed();
    assert_eq!(
        metadata.tasks.get("cleanup").map(|t| t.status),
        Some(codeindexer_db::models::TaskStatus::Completed),
        "cleanup should still run for a job cancelled mid-flight"
    );

    harness.teardown().await;
}
