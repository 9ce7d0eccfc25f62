//! GitSync: brings `codebaseStoragePath` up to date with the codebase's
//! remote, full clone or incremental pull depending on job kind and what's
//! already on disk.

use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use codeindexer_db::models::JobKind;

use crate::collaborators::git::{DiffOp, GitClient};
use crate::config::is_excluded;
use crate::context::JobContext;
use crate::error::{EngineError, Result};

use super::Task;

pub struct GitSyncTask {
    pub git: std::sync::Arc<dyn GitClient>,
}

impl GitSyncTask {
    pub fn new(git: std::sync::Arc<dyn GitClient>) -> Self {
        Self { git }
    }
}

/// Drops files matching `files.excludeGlobs` or exceeding `files.maxBytes`,
/// so excluded/oversized files never appear in `filesAdded`/`filesChanged`
/// for CodeParse (or anything downstream) to process.
async fn filter_listing(root: &Path, files: Vec<String>, exclude_globs: &[String], max_bytes: u64) -> Vec<String> {
    let mut kept = Vec::with_capacity(files.len());
    for file in files {
        if is_excluded(exclude_globs, &file) {
            continue;
        }
        match tokio::fs::metadata(root.join(&file)).await {
            Ok(meta) if meta.len() > max_bytes => continue,
            _ => kept.push(file),
        }
    }
    kept
}

#[async_trait]
impl Task for GitSyncTask {
    fn name(&self) -> &'static str {
        "gitSync"
    }

    async fn execute(&self, ctx: &JobContext) -> Result<serde_json::Value> {
        let codebase = ctx
            .codebase
            .as_ref()
            .ok_or_else(|| EngineError::InvalidRequest("gitSync requires a codebase".to_string()))?;
        let path = &ctx.codebase_storage_path;

        let is_incremental =
            matches!(ctx.kind, JobKind::CodebaseIncr) && self.git.is_valid_repo(path).await;

        let (commit_hash, files_added, files_changed, files_deleted) = if is_incremental {
            let before = self
                .git
                .current_commit(path)
                .await
                .map_err(EngineError::GitError)?;
            let after = self
                .git
                .pull(path, &codebase.branch)
                .await
                .map_err(EngineError::GitError)?;

            if before == after {
                (after, Vec::new(), Vec::new(), Vec::new())
            } else {
                let diff = self
                    .git
                    .diff(path, &before, &after)
                    .await
                    .map_err(EngineError::GitError)?;

                let mut added = Vec::new();
                let mut changed = Vec::new();
                let mut deleted = Vec::new();
                for entry in diff {
                    match entry.operation {
                        DiffOp::Added => added.push(entry.path),
                        DiffOp::Modified => changed.push(entry.path),
                        DiffOp::Deleted => deleted.push(entry.path),
                    }
                }
                (after, added, changed, deleted)
            }
        } else {
            let commit = self
                .git
                .clone(&codebase.remote_url, path, &codebase.branch, ctx.config.git_shallow)
                .await
                .map_err(EngineError::GitError)?;
            let files = self.git.list_files(path).await.map_err(EngineError::GitError)?;
            (commit, files, Vec::new(), Vec::new())
        };

        let files_added = filter_listing(path, files_added, &ctx.config.files_exclude_globs, ctx.config.files_max_bytes).await;
        let files_changed = filter_listing(path, files_changed, &ctx.config.files_exclude_globs, ctx.config.files_max_bytes).await;

        Ok(json!({
            "clonePath": path.to_string_lossy(),
            "commitHash": commit_hash,
            "filesAdded": files_added,
            "filesChanged": files_changed,
            "filesDeleted": files_deleted,
        }))
    }
}
