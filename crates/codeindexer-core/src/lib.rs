//! Job orchestration engine: validates and admits indexing jobs, runs their
//! task pipelines against a bounded worker pool, and persists every
//! state-machine edge through `codeindexer-db`.

pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod state;
pub mod task;
pub mod timeout_policy;
pub mod worker_pool;

pub use collaborators::Collaborators;
pub use config::EngineConfig;
pub use context::JobContext;
pub use error::{EngineError, Result};
pub use orchestrator::{CreateJobRequest, JobOrchestrator, JobsForCodebase, SystemStatus};
