//! GraphUpdate: folds CodeParse's results into the graph store, and tears
//! down graph state for files GitSync reported deleted.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use codeindexer_db::models::JobKind;

use crate::collaborators::graph::{GraphSink, UpsertOutcome};
use crate::context::JobContext;
use crate::error::{EngineError, Result};

use super::Task;

pub struct GraphUpdateTask {
    pub graph: Arc<dyn GraphSink>,
}

impl GraphUpdateTask {
    pub fn new(graph: Arc<dyn GraphSink>) -> Self {
        Self { graph }
    }
}

fn tally(outcome: UpsertOutcome, created: &mut i64, updated: &mut i64) {
    match outcome {
        UpsertOutcome::Created => *created += 1,
        UpsertOutcome::Updated => *updated += 1,
    }
}

/// GraphUpdate sits at the same pipeline slot for every job kind, but each
/// kind's second stage writes its `results` array under a different task
/// name; `requires()` can't see `ctx.kind` (it takes no context), so the
/// dependency check lives in `validate()` instead.
fn results_source(kind: JobKind) -> &'static str {
    match kind {
        JobKind::CodebaseFull | JobKind::CodebaseIncr => "codeParsing",
        JobKind::DocsFull | JobKind::DocsIncr => "docProcessing",
        JobKind::ApiAnalysis => "apiAnalysis",
        JobKind::UserflowAnalysis => "flowAnalysis",
    }
}

#[async_trait]
impl Task for GraphUpdateTask {
    fn name(&self) -> &'static str {
        "graphUpdate"
    }

    fn validate(&self, ctx: &JobContext) -> Result<()> {
        let source = results_source(ctx.kind);
        if !ctx.has(source) {
            return Err(EngineError::InvalidRequest(format!(
                "task 'graphUpdate' requires data from '{source}', which has not been written"
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &JobContext) -> Result<serde_json::Value> {
        let mut nodes_created = 0i64;
        let mut nodes_updated = 0i64;
        let mut relationships_created = 0i64;
        let mut relationships_updated = 0i64;

        let project_key = json!({ "id": ctx.project.id });
        tally(
            self.graph
                .upsert_node("Project", &project_key, &json!({ "name": ctx.project.name }))
                .await
                .map_err(EngineError::GraphError)?,
            &mut nodes_created,
            &mut nodes_updated,
        );

        let codebase_id = if let Some(codebase) = &ctx.codebase {
            let codebase_key = json!({ "id": codebase.id });
            tally(
                self.graph
                    .upsert_node(
                        "Codebase",
                        &codebase_key,
                        &json!({ "remoteUrl": codebase.remote_url, "branch": codebase.branch }),
                    )
                    .await
                    .map_err(EngineError::GraphError)?,
                &mut nodes_created,
                &mut nodes_updated,
            );
            tally(
                self.graph
                    .upsert_edge("Project", &project_key, "Codebase", &codebase_key, "CONTAINS", &json!({}))
                    .await
                    .map_err(EngineError::GraphError)?,
                &mut relationships_created,
                &mut relationships_updated,
            );
            Some(codebase.id.to_string())
        } else {
            None
        };

        let upstream = ctx.get(results_source(ctx.kind)).expect("validated by validate()");
        let results = upstream["results"].as_array().cloned().unwrap_or_default();
        let batch_size = ctx.config.graph_batch_size.max(1);

        for batch in results.chunks(batch_size) {
            if ctx.is_cancelled() {
                return Err(EngineError::Cancelled(ctx.job_id));
            }

            for file_result in batch {
                let path = file_result["path"].as_str().unwrap_or_default();
                let file_key = json!({ "codebase_id": codebase_id, "path": path });

                tally(
                    self.graph
                        .upsert_node("File", &file_key, &json!({}))
                        .await
                        .map_err(EngineError::GraphError)?,
                    &mut nodes_created,
                    &mut nodes_updated,
                );

                if let Some(codebase) = &ctx.codebase {
                    let codebase_key = json!({ "id": codebase.id });
                    tally(
                        self.graph
                            .upsert_edge("Codebase", &codebase_key, "File", &file_key, "CONTAINS", &json!({}))
                            .await
                            .map_err(EngineError::GraphError)?,
                        &mut relationships_created,
                        &mut relationships_updated,
                    );
                }

                let symbols = file_result["symbols"].as_array().cloned().unwrap_or_default();
                for symbol in symbols {
                    let symbol_key = json!({
                        "codebase_id": codebase_id,
                        "file": path,
                        "name": symbol["name"],
                        "kind": symbol["kind"],
                    });
                    tally(
                        self.graph
                            .upsert_node("Symbol", &symbol_key, &symbol)
                            .await
                            .map_err(EngineError::GraphError)?,
                        &mut nodes_created,
                        &mut nodes_updated,
                    );
                    tally(
                        self.graph
                            .upsert_edge("File", &file_key, "Symbol", &symbol_key, "DEFINES", &json!({}))
                            .await
                            .map_err(EngineError::GraphError)?,
                        &mut relationships_created,
                        &mut relationships_updated,
                    );
                }
            }
        }

        let mut nodes_deleted = 0i64;
        let mut edges_deleted = 0i64;
        if matches!(ctx.kind, JobKind::CodebaseIncr) {
            if let (Some(git_sync), Some(id)) = (ctx.get("gitSync"), codebase_id.as_ref()) {
                let deleted: Vec<String> = git_sync["filesDeleted"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                for path in deleted {
                    let outcome = self
                        .graph
                        .delete_file(id, &path)
                        .await
                        .map_err(EngineError::GraphError)?;
                    nodes_deleted += outcome.nodes_deleted;
                    edges_deleted += outcome.edges_deleted;
                }
            }
        }

        Ok(json!({
            "nodesCreated": nodes_created,
            "nodesUpdated": nodes_updated,
            "relationshipsCreated": relationships_created,
            "relationshipsUpdated": relationships_updated,
            "nodesDeleted": nodes_deleted,
            "edgesDeleted": edges_deleted,
        }))
    }
}
