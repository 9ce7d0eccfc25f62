//! Cleanup: removes the job's scratch directories. Always runs, never fails
//! the pipeline — disk errors here become warnings on the job.

use async_trait::async_trait;
use serde_json::json;

use crate::context::JobContext;
use crate::error::Result;

use super::Task;

#[derive(Default)]
pub struct CleanupTask;

async fn remove_dir_accounting(path: &std::path::Path) -> (i64, i64) {
    let mut files_removed = 0i64;
    let mut bytes_freed = 0i64;

    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(metadata) = entry.metadata().await else { continue };
            if metadata.is_dir() {
                stack.push(entry.path());
            } else {
                files_removed += 1;
                bytes_freed += metadata.len() as i64;
            }
        }
    }

    (files_removed, bytes_freed)
}

#[async_trait]
impl Task for CleanupTask {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn execute(&self, ctx: &JobContext) -> Result<serde_json::Value> {
        let mut files_removed = 0i64;
        let mut bytes_freed = 0i64;

        if ctx.config.cleanup_delete_temp && ctx.temp_dir.exists() {
            let (f, b) = remove_dir_accounting(&ctx.temp_dir).await;
            files_removed += f;
            bytes_freed += b;
            let _ = tokio::fs::remove_dir_all(&ctx.temp_dir).await;
        }

        if ctx.config.cleanup_delete_working_dir && ctx.working_dir.exists() {
            let (f, b) = remove_dir_accounting(&ctx.working_dir).await;
            files_removed += f;
            bytes_freed += b;
            let _ = tokio::fs::remove_dir_all(&ctx.working_dir).await;
        }

        Ok(json!({
            "tempFilesRemoved": files_removed,
            "bytesFreed": bytes_freed,
        }))
    }
}
