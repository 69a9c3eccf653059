//! Entry point for the runner service: accepts pipeline submissions,
//! reconciles crash markers from a prior process, and serves run status,
//! cancellation, log streaming, and preview over a small JSON/SSE API.
//!
//! Transport is `axum` rather than a generated gRPC stub — see
//! `DESIGN.md`'s note on `rat-rpc` for why. The operations it exposes
//! (`SubmitPipeline`, `GetRunStatus`, `CancelRun`, `StreamLogs`,
//! `PreviewPipeline`) mirror the original proto surface one-for-one.

mod routes;
mod single_shot;
mod state;
mod validate;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rat_core::{NessieConfig, RunnerConfig, S3Config};
use rat_runner::Registry;

use crate::state::AppState;

/// Runner server CLI flags. Everything else (credentials, bucket, catalog
/// URL, concurrency caps) comes from environment variables so the same
/// binary runs unmodified across environments — see §6 of the spec for the
/// full variable list.
#[derive(Parser, Debug)]
#[command(name = "rat-runner-server")]
#[command(about = "RAT pipeline runner service")]
struct Args {
    /// HTTP port to bind. Overrides GRPC_PORT (kept for env-var parity with
    /// the original deployment's naming) when set.
    #[arg(long)]
    port: Option<u16>,

    /// Execute a single pipeline read from `PIPELINE_NAMESPACE` /
    /// `PIPELINE_LAYER` / `PIPELINE_NAME` / `RUN_TRIGGER`, print the result
    /// as JSON to stdout, and exit — no HTTP server is bound. Mirrors the
    /// original's `RUN_MODE=single` cron-style invocation.
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let s3_config = S3Config::from_env().context("loading S3 configuration")?;
    let nessie_config = NessieConfig::from_env();

    if args.once {
        return single_shot::run_once(s3_config, nessie_config).await;
    }

    let mut runner_config = RunnerConfig::from_env().context("loading runner configuration")?;
    if let Some(port) = args.port {
        runner_config.grpc_port = port;
    }

    let registry = Registry::new(runner_config.clone());
    registry.reconcile_crashed_runs().await;

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], 9101))
        .install()
    {
        tracing::warn!(error = %e, "failed to install prometheus exporter, continuing without /metrics");
    }

    let state = Arc::new(AppState {
        registry,
        s3_config,
        nessie_config,
        store_cache: rat_store::StoreClientCache::new(),
    });

    let app = routes::router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], runner_config.grpc_port));
    tracing::info!(%addr, "rat-runner-server listening");

    let listener = tokio::net::TcpListener::bind(addr).await.context("binding HTTP listener")?;

    let shutdown_state = state.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, cancelling active runs");
        shutdown_state.registry.shutdown().await;
    });

    server.await.context("HTTP server error")?;
    Ok(ExitCode::SUCCESS)
}
