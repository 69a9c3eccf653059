//! Entry point for the query service: registers Iceberg tables discovered
//! from the Nessie catalog as DataFusion views and serves read-only
//! analytical SQL over them, refreshing the view set in the background.
//!
//! Transport is `axum`, mirroring `bins/rat-runner-server` — see
//! `DESIGN.md`'s note on `rat-rpc` for why no generated gRPC stub is used.

mod json_rows;
mod registrar;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rat_catalog::NessieCatalog;
use rat_core::{EngineConfig, NessieConfig, QueryConfig, S3Config};
use rat_engine::QueryEngine;

use crate::registrar::EngineRegistrar;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "rat-query-server")]
#[command(about = "RAT lakehouse query service")]
struct Args {
    /// HTTP port to bind. Overrides QUERY_GRPC_PORT when set.
    #[arg(long)]
    port: Option<u16>,
}

async fn refresh_loop(catalog: Arc<NessieCatalog<EngineRegistrar>>, namespaces: Vec<String>, interval: Duration) {
    loop {
        for ns in &namespaces {
            if let Err(e) = catalog.register_tables(ns).await {
                tracing::warn!(namespace = %ns, error = %e, "table discovery refresh failed");
            }
        }
        tokio::time::sleep(interval).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let s3_config = S3Config::from_env().context("loading S3 configuration")?;
    let engine_config = EngineConfig::from_env().context("loading engine configuration")?;
    let nessie_config = NessieConfig::from_env();
    let mut query_config = QueryConfig::from_env().context("loading query configuration")?;
    if let Some(port) = args.port {
        query_config.grpc_port = port;
    }

    let engine = Arc::new(QueryEngine::new(&s3_config, &engine_config).context("constructing query engine")?);
    let registrar = EngineRegistrar::new(engine.clone());
    let catalog = Arc::new(NessieCatalog::new(nessie_config, s3_config.bucket.clone(), registrar));

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], 9102))
        .install()
    {
        tracing::warn!(error = %e, "failed to install prometheus exporter, continuing without /metrics");
    }

    tracing::info!(namespaces = ?query_config.namespaces, "performing initial table discovery");
    for ns in &query_config.namespaces {
        if let Err(e) = catalog.register_tables(ns).await {
            tracing::warn!(namespace = %ns, error = %e, "initial table discovery failed, will retry on the refresh loop");
        }
    }

    let refresh_handle = tokio::spawn(refresh_loop(
        catalog.clone(),
        query_config.namespaces.clone(),
        Duration::from_secs(query_config.refresh_interval_seconds),
    ));

    let state = Arc::new(AppState { engine, catalog, config: query_config.clone() });
    let app = routes::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], query_config.grpc_port));
    tracing::info!(%addr, "rat-query-server listening");

    let listener = tokio::net::TcpListener::bind(addr).await.context("binding HTTP listener")?;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    });

    server.await.context("HTTP server error")?;
    refresh_handle.abort();
    Ok(())
}
