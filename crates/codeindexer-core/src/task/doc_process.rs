//! DocProcess: second step of the `DOCS_FULL`/`DOCS_INCR` pipeline.
//! Stub-level, see `doc_sync`.

use async_trait::async_trait;
use serde_json::json;

use crate::context::JobContext;
use crate::error::Result;

use super::Task;

#[derive(Default)]
pub struct DocProcessTask;

#[async_trait]
impl Task for DocProcessTask {
    fn name(&self) -> &'static str {
        "docProcessing"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["docSync"]
    }

    async fn execute(&self, _ctx: &JobContext) -> Result<serde_json::Value> {
        Ok(json!({ "documentsProcessed": 0, "results": [] }))
    }
}
