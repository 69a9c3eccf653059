//! `--once` mode: execute one pipeline synchronously through the same
//! state machine the server uses, print the result as JSON, and exit.
//! No registry, no admission cap, no crash marker — this is a cron-style
//! invocation, not a long-lived process with concurrent runs to track.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use rat_core::{NessieConfig, RunState, RunStatus, S3Config};
use rat_runner::{execute_pipeline, retry_if_configured, PipelineRunInputs};

#[derive(serde::Serialize)]
struct OnceResult {
    run_id: String,
    status: &'static str,
    rows_written: u64,
    duration_ms: u64,
    error: String,
    archived_landing_zones: Vec<String>,
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::Success => "success",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

pub async fn run_once(s3_config: S3Config, nessie_config: NessieConfig) -> anyhow::Result<ExitCode> {
    let namespace = env::var("PIPELINE_NAMESPACE").map_err(|_| anyhow::anyhow!("PIPELINE_NAMESPACE is required for --once"))?;
    let layer = env::var("PIPELINE_LAYER").map_err(|_| anyhow::anyhow!("PIPELINE_LAYER is required for --once"))?;
    let pipeline_name = env::var("PIPELINE_NAME").map_err(|_| anyhow::anyhow!("PIPELINE_NAME is required for --once"))?;
    let trigger = env::var("RUN_TRIGGER").unwrap_or_else(|_| "cron".to_string());
    let run_id = env::var("RUN_ID").unwrap_or_else(|_| RunState::generate_run_id());

    let run = Arc::new(RunState::new(run_id.clone(), namespace, layer, pipeline_name, trigger));

    let inputs = PipelineRunInputs { s3_config, nessie_config, published_versions: None };
    execute_pipeline(&run, &inputs).await;

    if run.status() == RunStatus::Failed {
        let config_key = format!(
            "{}/pipelines/{}/{}/config.yaml",
            run.namespace, run.layer, run.pipeline_name
        );
        let store = rat_store::StoreClientCache::new();
        if let Ok(client) = store.get(&inputs.s3_config).await {
            if let Ok(Some(yaml)) = rat_store::read_text(client.as_ref(), &config_key).await {
                if let Ok(config) = rat_core::parse_pipeline_config(&yaml) {
                    retry_if_configured(&run, &config, &inputs).await;
                }
            }
        }
    }

    let result = OnceResult {
        run_id: run.run_id.clone(),
        status: status_label(run.status()),
        rows_written: run.rows_written(),
        duration_ms: run.duration_ms(),
        error: rat_rpc::sanitize_error(&run.error()),
        archived_landing_zones: run.archived_zones(),
    };
    println!("{}", serde_json::to_string(&result)?);

    Ok(match run.status() {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::Cancelled => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    })
}
