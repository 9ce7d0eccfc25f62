//! Engine configuration: a strongly typed, fully validated configuration
//! assembled from CLI flag > environment variable > TOML config file >
//! built-in default, the same chain shape as the teacher's `GatorConfig::resolve`.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use codeindexer_db::config::DbConfig;
use codeindexer_db::models::JobKind;

/// On-disk config file shape, loaded from `~/.config/codeindexer/config.toml`
/// (or `$XDG_CONFIG_HOME/codeindexer/config.toml`).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub jobs: Option<JobsSection>,
    #[serde(default)]
    pub graph: Option<GraphSection>,
    #[serde(default)]
    pub git: Option<GitSection>,
    #[serde(default)]
    pub files: Option<FilesSection>,
    #[serde(default)]
    pub cleanup: Option<CleanupSection>,
    #[serde(default)]
    pub storage: Option<StorageSection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct JobsSection {
    pub max_concurrent: Option<usize>,
    pub default_timeout_ms: Option<u64>,
    #[serde(default)]
    pub timeout_multipliers: HashMap<String, f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphSection {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GitSection {
    pub shallow: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilesSection {
    pub max_bytes: Option<u64>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupSection {
    pub delete_working_dir: Option<bool>,
    pub delete_temp: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageSection {
    pub root: Option<String>,
}

/// Return the codeindexer config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/codeindexer` or
/// `~/.config/codeindexer`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("codeindexer");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("codeindexer")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn load_config_file() -> Option<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path).ok()?;
    toml::from_str(&contents).ok()
}

/// Fully resolved, validated job-orchestration engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db: DbConfig,
    pub jobs_max_concurrent: usize,
    pub jobs_default_timeout_ms: u64,
    pub jobs_timeout_multipliers: HashMap<JobKind, f64>,
    pub graph_batch_size: usize,
    pub git_shallow: bool,
    pub files_max_bytes: u64,
    pub files_exclude_globs: Vec<String>,
    pub cleanup_delete_working_dir: bool,
    pub cleanup_delete_temp: bool,
    pub storage_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            jobs_max_concurrent: 4,
            jobs_default_timeout_ms: 300_000,
            jobs_timeout_multipliers: default_timeout_multipliers(),
            graph_batch_size: 200,
            git_shallow: true,
            files_max_bytes: 2 * 1024 * 1024,
            files_exclude_globs: vec!["**/node_modules/**".into(), "**/.git/**".into()],
            cleanup_delete_working_dir: true,
            cleanup_delete_temp: true,
            storage_root: std::env::temp_dir().join("codeindexer"),
        }
    }
}

/// Minimal glob matcher: supports the single leading/trailing `*`-delimited
/// `**` wildcard used by the default exclude globs (`**/node_modules/**`).
fn glob_matches(glob: &str, path: &str) -> bool {
    let needle = glob.trim_start_matches("**/").trim_end_matches("/**");
    !needle.is_empty() && path.contains(needle)
}

/// Whether `path` should be skipped per `files.excludeGlobs`. Shared between
/// GitSync (which applies it to the listing) and CodeParse (which applies it
/// again before handing buckets to the parser).
pub fn is_excluded(globs: &[String], path: &str) -> bool {
    globs.iter().any(|glob| glob_matches(glob, path))
}

fn default_timeout_multipliers() -> HashMap<JobKind, f64> {
    let mut m = HashMap::new();
    m.insert(JobKind::CodebaseFull, 3.0);
    m.insert(JobKind::CodebaseIncr, 0.5);
    m.insert(JobKind::DocsFull, 0.3);
    m.insert(JobKind::DocsIncr, 0.3);
    m.insert(JobKind::ApiAnalysis, 2.0);
    m.insert(JobKind::UserflowAnalysis, 2.0);
    m
}

/// Overrides an operator may supply on the command line; `None` means "fall
/// through to env/file/default".
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub jobs_max_concurrent: Option<usize>,
    pub storage_root: Option<String>,
}

impl EngineConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default. Validates the result before returning it.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let file = load_config_file();
        let mut config = Self::default();

        let db_url = overrides
            .database_url
            .clone()
            .or_else(|| std::env::var("CODEINDEXER_DATABASE_URL").ok())
            .or_else(|| file.as_ref().and_then(|f| f.database.as_ref()).map(|d| d.url.clone()));
        if let Some(url) = db_url {
            config.db = DbConfig::new(&url);
        }

        if let Some(jobs) = file.as_ref().and_then(|f| f.jobs.as_ref()) {
            if let Some(v) = jobs.max_concurrent {
                config.jobs_max_concurrent = v;
            }
            if let Some(v) = jobs.default_timeout_ms {
                config.jobs_default_timeout_ms = v;
            }
            for (kind_str, mult) in &jobs.timeout_multipliers {
                if let Ok(kind) = kind_str.parse::<JobKind>() {
                    config.jobs_timeout_multipliers.insert(kind, *mult);
                }
            }
        }
        if let Ok(v) = std::env::var("CODEINDEXER_JOBS_MAX_CONCURRENT") {
            config.jobs_max_concurrent = v
                .parse()
                .context("CODEINDEXER_JOBS_MAX_CONCURRENT must be a positive integer")?;
        }
        if let Some(v) = overrides.jobs_max_concurrent {
            config.jobs_max_concurrent = v;
        }

        if let Some(graph) = file.as_ref().and_then(|f| f.graph.as_ref())
            && let Some(v) = graph.batch_size
        {
            config.graph_batch_size = v;
        }

        if let Some(git) = file.as_ref().and_then(|f| f.git.as_ref())
            && let Some(v) = git.shallow
        {
            config.git_shallow = v;
        }

        if let Some(files) = file.as_ref().and_then(|f| f.files.as_ref()) {
            if let Some(v) = files.max_bytes {
                config.files_max_bytes = v;
            }
            if !files.exclude_globs.is_empty() {
                config.files_exclude_globs = files.exclude_globs.clone();
            }
        }

        if let Some(cleanup) = file.as_ref().and_then(|f| f.cleanup.as_ref()) {
            if let Some(v) = cleanup.delete_working_dir {
                config.cleanup_delete_working_dir = v;
            }
            if let Some(v) = cleanup.delete_temp {
                config.cleanup_delete_temp = v;
            }
        }

        let storage_root = overrides
            .storage_root
            .clone()
            .or_else(|| std::env::var("CODEINDEXER_STORAGE_ROOT").ok())
            .or_else(|| {
                file.as_ref()
                    .and_then(|f| f.storage.as_ref())
                    .and_then(|s| s.root.clone())
            });
        if let Some(root) = storage_root {
            config.storage_root = PathBuf::from(root);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.jobs_max_concurrent == 0 {
            bail!("jobs.max_concurrent must be positive");
        }
        if self.jobs_default_timeout_ms == 0 {
            bail!("jobs.default_timeout_ms must be positive");
        }
        if self.graph_batch_size == 0 {
            bail!("graph.batch_size must be positive");
        }
        if self.storage_root.as_os_str().is_empty() {
            bail!("storage.root must not be empty");
        }
        Ok(())
    }

    /// The effective per-job timeout: `default * multiplier[kind]` (or `*1`
    /// if no multiplier is configured for that kind).
    pub fn timeout_for(&self, kind: JobKind) -> std::time::Duration {
        let multiplier = self.jobs_timeout_multipliers.get(&kind).copied().unwrap_or(1.0);
        let ms = (self.jobs_default_timeout_ms as f64 * multiplier).max(1.0) as u64;
        std::time::Duration::from_millis(ms)
    }
}
