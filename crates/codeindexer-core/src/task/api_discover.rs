//! ApiDiscover: first step of the `API_ANALYSIS` pipeline. Stub-level, see
//! `doc_sync`.

use async_trait::async_trait;
use serde_json::json;

use crate::context::JobContext;
use crate::error::Result;

use super::Task;

#[derive(Default)]
pub struct ApiDiscoverTask;

#[async_trait]
impl Task for ApiDiscoverTask {
    fn name(&self) -> &'static str {
        "apiDiscovery"
    }

    async fn execute(&self, _ctx: &JobContext) -> Result<serde_json::Value> {
        Ok(json!({ "endpointsDiscovered": [] }))
    }
}
