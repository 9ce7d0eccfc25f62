//! DocSync: first step of the `DOCS_FULL`/`DOCS_INCR` pipeline. Stub-level —
//! satisfies the `Task` contract and pipeline ordering but does not perform
//! real documentation discovery.

use async_trait::async_trait;
use serde_json::json;

use crate::context::JobContext;
use crate::error::Result;

use super::Task;

#[derive(Default)]
pub struct DocSyncTask;

#[async_trait]
impl Task for DocSyncTask {
    fn name(&self) -> &'static str {
        "docSync"
    }

    async fn execute(&self, _ctx: &JobContext) -> Result<serde_json::Value> {
        Ok(json!({ "documentsDiscovered": [] }))
    }
}
