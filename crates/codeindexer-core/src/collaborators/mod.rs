//! Collaborator contracts: the boundary the core talks through to reach
//! Git, language parsers, and the graph store. Each contract has exactly one
//! concrete, reference-grade implementation in this module tree.

pub mod git;
pub mod graph;
pub mod parser;

use std::sync::Arc;

pub use git::{DiffEntry, DiffOp, GitClient, ShellGitClient};
pub use graph::{GraphSink, PgGraphSink, UpsertOutcome};
pub use parser::{ParseResult, Parser, RegexParser, Symbol};

/// The concrete collaborator set a pipeline run is wired against. Held once
/// by the orchestrator and cloned (cheaply, via `Arc`) into every job's task
/// list.
#[derive(Clone)]
pub struct Collaborators {
    pub git: Arc<dyn GitClient>,
    pub parser: Arc<dyn Parser>,
    pub graph: Arc<dyn GraphSink>,
}
