//! Retry wrapper: re-runs a failed pipeline up to `config.max_retries`
//! times with `config.retry_delay_seconds` between attempts, honoring
//! cancellation during the delay.

use std::sync::Arc;

use rat_core::{PipelineConfig, RunState, RunStatus};

use crate::executor::{execute_pipeline, PipelineRunInputs};

/// Retry `run` according to `config`'s retry policy, in place. Only called
/// after an initial attempt left `run` in `Failed` — cancellation and
/// success both short-circuit without consuming further attempts.
pub async fn retry_if_configured(run: &Arc<RunState>, config: &PipelineConfig, inputs: &PipelineRunInputs) {
    if config.max_retries == 0 || run.status() != RunStatus::Failed {
        return;
    }

    let delay = std::time::Duration::from_secs(config.retry_delay_seconds);

    for attempt in 1..=config.max_retries {
        run.add_log(
            rat_core::LogLevel::Info,
            format!("Retrying ({attempt}/{}) after {}s...", config.max_retries, config.retry_delay_seconds),
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = run.cancel.cancelled() => {
                run.add_log(rat_core::LogLevel::Warn, "Retry cancelled by user");
                return;
            }
        }

        run.set_status(RunStatus::Running);
        run.set_error(String::new());
        run.set_rows_written(0);
        run.set_duration_ms(0);

        execute_pipeline(run, inputs).await;

        match run.status() {
            RunStatus::Failed => {
                run.add_log(
                    rat_core::LogLevel::Warn,
                    format!("Retry {attempt}/{} failed: {}", config.max_retries, run.error()),
                );
            }
            RunStatus::Success => {
                run.add_log(rat_core::LogLevel::Info, format!("Pipeline succeeded on retry {attempt}"));
                return;
            }
            _ => return,
        }
    }

    tracing::warn!(run_id = %run.run_id, max_retries = config.max_retries, "all retries exhausted");
}
