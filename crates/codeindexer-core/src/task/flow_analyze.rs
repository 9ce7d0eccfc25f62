//! FlowAnalyze: second step of the `USERFLOW_ANALYSIS` pipeline. Stub-level,
//! see `doc_sync`.

use async_trait::async_trait;
use serde_json::json;

use crate::context::JobContext;
use crate::error::Result;

use super::Task;

#[derive(Default)]
pub struct FlowAnalyzeTask;

#[async_trait]
impl Task for FlowAnalyzeTask {
    fn name(&self) -> &'static str {
        "flowAnalysis"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["flowDiscovery"]
    }

    async fn execute(&self, _ctx: &JobContext) -> Result<serde_json::Value> {
        Ok(json!({ "flowsAnalyzed": 0, "results": [] }))
    }
}
