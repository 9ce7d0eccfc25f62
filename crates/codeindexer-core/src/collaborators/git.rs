//! `GitClient` contract, implemented by shelling out to the system `git`
//! binary — the same idiom used elsewhere in this codebase for running
//! external commands under a deadline: spawn, await with
//! `tokio::time::timeout`, kill on expiry. Never `git2`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub operation: DiffOp,
    pub path: String,
    pub old_path: Option<String>,
}

#[async_trait]
pub trait GitClient: Send + Sync {
    async fn is_valid_repo(&self, path: &Path) -> bool;
    async fn clone(&self, url: &str, path: &Path, branch: &str, shallow: bool) -> Result<String>;
    async fn pull(&self, path: &Path, branch: &str) -> Result<String>;
    async fn current_commit(&self, path: &Path) -> Result<String>;
    async fn diff(&self, path: &Path, from_commit: &str, to_commit: &str) -> Result<Vec<DiffEntry>>;
    async fn list_files(&self, path: &Path) -> Result<Vec<String>>;
    async fn delete_repo(&self, path: &Path) -> Result<()>;
}

/// Shells out to the system `git` binary. Every invocation runs under a
/// generous fixed deadline so a hung network clone cannot wedge a worker
/// forever; the pipeline's own per-task deadline is the primary guard.
pub struct ShellGitClient {
    command_timeout: Duration,
}

impl Default for ShellGitClient {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(600),
        }
    }
}

impl ShellGitClient {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);

        let child = cmd.output();
        let output = tokio::time::timeout(self.command_timeout, child)
            .await
            .with_context(|| format!("git {args:?} timed out after {:?}", self.command_timeout))?
            .with_context(|| format!("failed to spawn git {args:?}"))?;

        if !output.status.success() {
            bail!(
                "git {args:?} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl GitClient for ShellGitClient {
    async fn is_valid_repo(&self, path: &Path) -> bool {
        path.join(".git").is_dir()
    }

    async fn clone(&self, url: &str, path: &Path, branch: &str, shallow: bool) -> Result<String> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        if path.exists() {
            tokio::fs::remove_dir_all(path)
                .await
                .with_context(|| format!("failed to clear existing path {}", path.display()))?;
        }

        let path_str = path.to_string_lossy().to_string();
        let mut args = vec!["clone", "--branch", branch, url, path_str.as_str()];
        if shallow {
            args.insert(1, "--depth");
            args.insert(2, "1");
        }
        self.run(None, &args).await?;
        self.current_commit(path).await
    }

    async fn pull(&self, path: &Path, branch: &str) -> Result<String> {
        self.run(Some(path), &["fetch", "origin", branch]).await?;
        self.run(Some(path), &["checkout", branch]).await?;
        self.run(Some(path), &["reset", "--hard", &format!("origin/{branch}")])
            .await?;
        self.current_commit(path).await
    }

    async fn current_commit(&self, path: &Path) -> Result<String> {
        self.run(Some(path), &["rev-parse", "HEAD"]).await
    }

    async fn diff(&self, path: &Path, from_commit: &str, to_commit: &str) -> Result<Vec<DiffEntry>> {
        let spec = format!("{from_commit}..{to_commit}");
        let output = self
            .run(Some(path), &["diff", "--name-status", &spec])
            .await?;

        let mut entries = Vec::new();
        for line in output.lines() {
            let mut fields = line.split('\t');
            let Some(status) = fields.next() else { continue };
            match status.chars().next() {
                Some('A') => {
                    if let Some(p) = fields.next() {
                        entries.push(DiffEntry {
                            operation: DiffOp::Added,
                            path: normalize(p),
                            old_path: None,
                        });
                    }
                }
                Some('M') => {
                    if let Some(p) = fields.next() {
                        entries.push(DiffEntry {
                            operation: DiffOp::Modified,
                            path: normalize(p),
                            old_path: None,
                        });
                    }
                }
                Some('D') => {
                    if let Some(p) = fields.next() {
                        entries.push(DiffEntry {
                            operation: DiffOp::Deleted,
                            path: normalize(p),
                            old_path: None,
                        });
                    }
                }
                Some('R') => {
                    let old = fields.next().map(normalize);
                    let new = fields.next().map(normalize);
                    if let (Some(old), Some(new)) = (old.clone(), new.clone()) {
                        entries.push(DiffEntry {
                            operation: DiffOp::Deleted,
                            path: old,
                            old_path: None,
                        });
                        entries.push(DiffEntry {
                            operation: DiffOp::Added,
                            path: new,
                            old_path: old.into(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(entries)
    }

    async fn list_files(&self, path: &Path) -> Result<Vec<String>> {
        let output = self.run(Some(path), &["ls-files"]).await?;
        Ok(output.lines().map(normalize).collect())
    }

    async fn delete_repo(&self, path: &Path) -> Result<()> {
        if path.exists() {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| anyhow!("failed to delete repo at {}: {e}", path.display()))?;
        }
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    path.trim().replace('\\', "/")
}
