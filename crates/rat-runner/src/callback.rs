//! HTTP callback pushing terminal run status to the platform control plane.
//!
//! When a callback base URL is configured, the runner POSTs terminal status
//! updates directly instead of waiting for the platform to poll
//! `GetRunStatus`. Best-effort: a failed callback is logged and swallowed —
//! the platform's own poll loop is the fallback safety net.

use std::sync::Arc;

use serde::Serialize;

use rat_core::RunState;

#[derive(Debug, Serialize)]
struct StatusPayload {
    run_id: String,
    status: String,
    error: String,
    duration_ms: u64,
    rows_written: u64,
    archived_landing_zones: Vec<String>,
}

/// POST `run`'s terminal status to `{base_url}/api/v1/internal/runs/{run_id}/status`.
/// No-op for a non-terminal run, or when `base_url` is `None`.
pub async fn notify_run_complete(run: &Arc<RunState>, base_url: Option<&str>) {
    let Some(base_url) = base_url else { return };
    if !run.is_terminal() {
        tracing::debug!(run_id = %run.run_id, status = %run.status(), "skipping callback for non-terminal run");
        return;
    }

    let url = format!("{}/api/v1/internal/runs/{}/status", base_url.trim_end_matches('/'), run.run_id);
    let payload = StatusPayload {
        run_id: run.run_id.clone(),
        status: run.status().to_string(),
        error: run.error(),
        duration_ms: run.duration_ms(),
        rows_written: run.rows_written(),
        archived_landing_zones: run.archived_zones(),
    };

    let client = reqwest::Client::new();
    match client
        .post(&url)
        .json(&payload)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => {
            tracing::info!(run_id = %run.run_id, status = %run.status(), http_status = resp.status().as_u16(), "status callback sent");
        }
        Err(e) => {
            tracing::warn!(run_id = %run.run_id, url, error = %e, "status callback failed, platform will poll as fallback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rat_core::{RunState, RunStatus};

    #[tokio::test]
    async fn no_callback_when_base_url_absent() {
        let run = Arc::new(RunState::new("r1", "ns", "silver", "orders", "manual"));
        run.set_status(RunStatus::Success);
        notify_run_complete(&run, None).await;
    }

    #[tokio::test]
    async fn no_callback_for_non_terminal_run() {
        let run = Arc::new(RunState::new("r1", "ns", "silver", "orders", "manual"));
        run.set_status(RunStatus::Running);
        notify_run_complete(&run, Some("http://127.0.0.1:1")).await;
    }
}
