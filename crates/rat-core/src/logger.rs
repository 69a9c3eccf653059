//! Per-run logging: dual-writes into the run's bounded log buffer and into
//! `tracing`, so operators get both a streamable per-run log and ordinary
//! process logs.

use std::sync::Arc;

use crate::models::{LogLevel, RunState};

/// Structural logging surface injected into pipeline and quality-test
/// execution. Anything with these four methods can stand in for `RunLogger`
/// in tests.
pub trait PipelineLogger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);
}

/// The primary `PipelineLogger` implementation, bound to a single run.
pub struct RunLogger {
    run: Arc<RunState>,
}

impl RunLogger {
    pub fn new(run: Arc<RunState>) -> Self {
        Self { run }
    }
}

impl PipelineLogger for RunLogger {
    fn info(&self, message: &str) {
        self.run.add_log(LogLevel::Info, message);
        tracing::info!("[{}] {}", self.run.run_id, message);
    }

    fn warn(&self, message: &str) {
        self.run.add_log(LogLevel::Warn, message);
        tracing::warn!("[{}] {}", self.run.run_id, message);
    }

    fn error(&self, message: &str) {
        self.run.add_log(LogLevel::Error, message);
        tracing::error!("[{}] {}", self.run.run_id, message);
    }

    fn debug(&self, message: &str) {
        self.run.add_log(LogLevel::Debug, message);
        tracing::debug!("[{}] {}", self.run.run_id, message);
    }
}
