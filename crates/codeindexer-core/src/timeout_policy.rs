//! Maps a job kind to its effective timeout, given the configured base and
//! per-kind multipliers.

use std::time::Duration;

use codeindexer_db::models::JobKind;

use crate::config::EngineConfig;

pub struct JobTimeoutPolicy<'a> {
    config: &'a EngineConfig,
}

impl<'a> JobTimeoutPolicy<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn timeout_for(&self, kind: JobKind) -> Duration {
        self.config.timeout_for(kind)
    }
}
