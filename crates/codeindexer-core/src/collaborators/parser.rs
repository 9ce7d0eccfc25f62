//! `Parser` contract, with a regex/line-oriented in-process reference
//! implementation.
//!
//! This extracts top-level function/class/struct-like declarations per
//! language via a small per-language regex table. It mirrors the shape of a
//! real tree-sitter-backed parser without depending on per-language grammar
//! crates — a reference adapter, not a complete parser.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: String,
    pub start_line: usize,
    pub end_line: usize,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub path: String,
    pub symbols: Vec<Symbol>,
}

#[async_trait]
pub trait Parser: Send + Sync {
    /// Parse `files` (repo-relative paths, resolved against `repo_path`) as
    /// the given `language`, returning one result per file that yielded at
    /// least an attempt (files that fail to read are simply omitted, not
    /// treated as a hard error, so one bad file cannot sink a whole batch —
    /// a genuine parse error still propagates as `Err`).
    async fn parse(&self, language: &str, repo_path: &Path, files: &[String]) -> Result<Vec<ParseResult>>;
}

struct LanguageRules {
    function: Regex,
    type_decl: Regex,
}

fn rules_for(language: &str) -> Option<&'static LanguageRules> {
    static TABLE: OnceLock<HashMap<&'static str, LanguageRules>> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert(
            "ts",
            LanguageRules {
                function: Regex::new(r"^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)").unwrap(),
                type_decl: Regex::new(r"^\s*(?:export\s+)?(?:class|interface)\s+(\w+)").unwrap(),
            },
        );
        m.insert(
            "python",
            LanguageRules {
                function: Regex::new(r"^\s*def\s+(\w+)").unwrap(),
                type_decl: Regex::new(r"^\s*class\s+(\w+)").unwrap(),
            },
        );
        m.insert(
            "go",
            LanguageRules {
                function: Regex::new(r"^\s*func\s+(?:\([^)]*\)\s*)?(\w+)").unwrap(),
                type_decl: Regex::new(r"^\s*type\s+(\w+)\s+struct").unwrap(),
            },
        );
        m.insert(
            "rust",
            LanguageRules {
                function: Regex::new(r"^\s*(?:pub\s+)?(?:async\s+)?fn\s+(\w+)").unwrap(),
                type_decl: Regex::new(r"^\s*(?:pub\s+)?(?:struct|enum|trait)\s+(\w+)").unwrap(),
            },
        );
        m.insert(
            "java",
            LanguageRules {
                function: Regex::new(r"^\s*(?:public|private|protected)?\s*(?:static\s+)?\w[\w<>\[\]]*\s+(\w+)\s*\(")
                    .unwrap(),
                type_decl: Regex::new(r"^\s*(?:public\s+)?(?:class|interface)\s+(\w+)").unwrap(),
            },
        );
        m.insert(
            "cpp",
            LanguageRules {
                function: Regex::new(r"^\s*\w[\w:<>&*\s]*\s+(\w+)\s*\([^;]*\)\s*\{").unwrap(),
                type_decl: Regex::new(r"^\s*(?:class|struct)\s+(\w+)").unwrap(),
            },
        );
        m
    });
    table.get(language)
}

/// Map a file extension to the language bucket used for parser dispatch.
/// Extensions without a mapping are not indexed.
pub fn language_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "ts" | "tsx" | "js" | "jsx" => Some("ts"),
        "py" => Some("python"),
        "go" => Some("go"),
        "rs" => Some("rust"),
        "java" => Some("java"),
        "c" | "h" | "cc" | "cpp" | "hpp" => Some("cpp"),
        _ => None,
    }
}

#[derive(Default)]
pub struct RegexParser;

#[async_trait]
impl Parser for RegexParser {
    async fn parse(&self, language: &str, repo_path: &Path, files: &[String]) -> Result<Vec<ParseResult>> {
        let rules = rules_for(language)
            .with_context(|| format!("no parse rules registered for language '{language}'"))?;

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let full_path = repo_path.join(file);
            let Ok(contents) = tokio::fs::read_to_string(&full_path).await else {
                continue;
            };

            let mut symbols = Vec::new();
            for (idx, line) in contents.lines().enumerate() {
                let line_no = idx + 1;
                if let Some(caps) = rules.function.captures(line) {
                    symbols.push(Symbol {
                        name: caps[1].to_string(),
                        kind: "function".to_string(),
                        start_line: line_no,
                        end_line: line_no,
                        signature: Some(line.trim().to_string()),
                    });
                } else if let Some(caps) = rules.type_decl.captures(line) {
                    symbols.push(Symbol {
                        name: caps[1].to_string(),
                        kind: "type".to_string(),
                        start_line: line_no,
                        end_line: line_no,
                        signature: Some(line.trim().to_string()),
                    });
                }
            }

            results.push(ParseResult {
                path: file.clone(),
                symbols,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_extensions() {
        assert_eq!(language_for_extension("ts"), Some("ts"));
        assert_eq!(language_for_extension("tsx"), Some("ts"));
        assert_eq!(language_for_extension("py"), Some("python"));
        assert_eq!(language_for_extension("rs"), Some("rust"));
        assert_eq!(language_for_extension("md"), None);
    }

    #[tokio::test]
    async fn extracts_rust_functions_and_types() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("lib.rs");
        tokio::fs::write(&file_path, "pub struct Foo;\n\npub fn bar() {}\n")
            .await
            .unwrap();

        let parser = RegexParser;
        let results = parser
            .parse("rust", dir.path(), &["lib.rs".to_string()])
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let names: Vec<&str> = results[0].symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Foo"));
        assert!(names.contains(&"bar"));
    }

    #[tokio::test]
    async fn skips_unreadable_files_without_failing_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let parser = RegexParser;
        let results = parser
            .parse("rust", dir.path(), &["missing.rs".to_string()])
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
