//! CodeParse: buckets the files GitSync reported by language and hands each
//! bucket to the `Parser` collaborator.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use codeindexer_db::models::JobKind;

use crate::collaborators::parser::{language_for_extension, Parser};
use crate::config::is_excluded;
use crate::context::JobContext;
use crate::error::{EngineError, Result};

use super::Task;

pub struct CodeParseTask {
    pub parser: Arc<dyn Parser>,
}

impl CodeParseTask {
    pub fn new(parser: Arc<dyn Parser>) -> Self {
        Self { parser }
    }
}

fn extension_of(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}

#[async_trait]
impl Task for CodeParseTask {
    fn name(&self) -> &'static str {
        "codeParsing"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["gitSync"]
    }

    async fn execute(&self, ctx: &JobContext) -> Result<serde_json::Value> {
        let git_sync = ctx.get("gitSync").expect("validated by requires()");

        let added: Vec<String> = git_sync["filesAdded"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let changed: Vec<String> = git_sync["filesChanged"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let input_files: Vec<String> = if matches!(ctx.kind, JobKind::CodebaseIncr) {
            added.into_iter().chain(changed).collect()
        } else {
            added
        };

        let mut by_language: HashMap<&'static str, Vec<String>> = HashMap::new();
        for file in &input_files {
            if is_excluded(&ctx.config.files_exclude_globs, file) {
                continue;
            }
            if let Ok(meta) = tokio::fs::metadata(ctx.codebase_storage_path.join(file)).await
                && meta.len() > ctx.config.files_max_bytes
            {
                continue;
            }
            let Some(ext) = extension_of(file) else { continue };
            let Some(lang) = language_for_extension(ext) else { continue };
            by_language.entry(lang).or_default().push(file.clone());
        }

        let mut files_processed = 0i64;
        let mut symbols_extracted = 0i64;
        let mut per_language = serde_json::Map::new();
        let mut results = Vec::new();

        for (lang, files) in by_language {
            let parsed = self
                .parser
                .parse(lang, &ctx.codebase_storage_path, &files)
                .await
                .map_err(EngineError::ParseError)?;

            per_language.insert(lang.to_string(), json!(parsed.len() as i64));
            files_processed += parsed.len() as i64;
            for result in &parsed {
                symbols_extracted += result.symbols.len() as i64;
            }
            results.extend(parsed.into_iter().map(|r| {
                json!({
                    "path": r.path,
                    "symbols": r.symbols,
                })
            }));
        }

        {
            let mut metrics = ctx.metrics.lock().unwrap();
            metrics.files_processed += files_processed;
            metrics.symbols_extracted += symbols_extracted;
            for (lang, count) in &per_language {
                *metrics.per_language.entry(lang.clone()).or_insert(0) +=
                    count.as_i64().unwrap_or(0);
            }
        }

        Ok(json!({
            "filesProcessed": files_processed,
            "symbolsExtracted": symbols_extracted,
            "perLanguage": per_language,
            "results": results,
        }))
    }
}
