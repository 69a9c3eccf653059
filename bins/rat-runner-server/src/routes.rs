//! HTTP routes for the runner service: SubmitPipeline, GetRunStatus,
//! CancelRun, StreamLogs (as Server-Sent Events when `follow=true`), and
//! PreviewPipeline.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};

use rat_core::{CrashMarker, LogRecord, RunState};
use rat_rpc::{
    CancelRunResponse, GetRunStatusResponse, LogEntryWire, PreviewPipelineRequest,
    PreviewPipelineResponse, RpcError, SubmitPipelineRequest, SubmitPipelineResponse,
    StreamLogsQuery, ValidatePipelineRequest, ValidatePipelineResponse,
};
use rat_runner::{execute_pipeline, preview_pipeline, retry_if_configured, PipelineRunInputs, RunnerError, DEFAULT_PREVIEW_LIMIT};

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/pipelines/submit", post(submit_pipeline))
        .route("/v1/pipelines/preview", post(preview))
        .route("/v1/pipelines/validate", post(validate))
        .route("/v1/runs/:run_id", get(get_run_status))
        .route("/v1/runs/:run_id/cancel", post(cancel_run))
        .route("/v1/runs/:run_id/logs", get(stream_logs))
        .with_state(state)
}

struct ApiError(RpcError);

impl From<RpcError> for ApiError {
    fn from(e: RpcError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({ "error": self.0.sanitized_message() }));
        (status, body).into_response()
    }
}

fn runner_error_to_rpc(e: RunnerError) -> RpcError {
    match e {
        RunnerError::AtCapacity { .. } => RpcError::ResourceExhausted(e.to_string()),
        RunnerError::RunNotFound(id) => RpcError::NotFound(id),
        other => RpcError::Internal(other.to_string()),
    }
}

async fn submit_pipeline(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitPipelineRequest>,
) -> Result<Json<SubmitPipelineResponse>, ApiError> {
    let run_id = req.run_id.clone().unwrap_or_else(RunState::generate_run_id);
    let run = Arc::new(RunState::new(
        run_id.clone(),
        req.namespace.clone(),
        req.layer.to_string(),
        req.pipeline_name.clone(),
        req.trigger.clone(),
    ));

    let mut env = req.env.clone().unwrap_or_default();
    if let Some(creds) = &req.s3_credentials {
        env.extend(creds.clone());
    }
    run.set_env(env);

    state
        .registry
        .admit(run.clone())
        .await
        .map_err(runner_error_to_rpc)?;

    let marker = CrashMarker {
        run_id: run_id.clone(),
        namespace: req.namespace.clone(),
        layer: req.layer.to_string(),
        pipeline_name: req.pipeline_name.clone(),
        trigger: req.trigger.clone(),
    };
    if let Err(e) = rat_runner::write_marker(state.registry.state_dir(), &marker) {
        tracing::warn!(run_id = %run_id, error = %e, "failed to write crash marker");
    }

    tracing::info!(run_id = %run_id, namespace = %req.namespace, layer = %req.layer, pipeline = %req.pipeline_name, "pipeline submitted");

    let inputs = PipelineRunInputs {
        s3_config: state.s3_config.clone(),
        nessie_config: state.nessie_config.clone(),
        published_versions: req.published_versions.clone(),
    };
    let dispatch_state = state.clone();
    let dispatch_run = run.clone();
    tokio::spawn(async move {
        dispatch_pipeline(dispatch_state, dispatch_run, inputs).await;
    });

    Ok(Json(SubmitPipelineResponse {
        run_id,
        status: run.status().into(),
    }))
}

/// Execute the run, then — if it ended `Failed` — read retry policy from
/// `config.yaml` independently of Phase 1's load (retry is a server-layer
/// concern, not part of the pipeline's own execution state) and retry it.
/// Always notifies the callback/removes the crash marker on exit.
async fn dispatch_pipeline(state: Arc<AppState>, run: Arc<RunState>, inputs: PipelineRunInputs) {
    execute_pipeline(&run, &inputs).await;

    if run.status() == rat_core::RunStatus::Failed {
        let env = run.env();
        let effective_s3 = if env.is_empty() {
            state.s3_config.clone()
        } else {
            state.s3_config.with_overrides(&env)
        };
        if let Ok(store) = state.store_cache.get(&effective_s3).await {
            let config_key = format!(
                "{}/pipelines/{}/{}/config.yaml",
                run.namespace, run.layer, run.pipeline_name
            );
            match rat_store::read_text(store.as_ref(), &config_key).await {
                Ok(Some(yaml)) => match rat_core::parse_pipeline_config(&yaml) {
                    Ok(config) => retry_if_configured(&run, &config, &inputs).await,
                    Err(e) => tracing::warn!(run_id = %run.run_id, error = %e, "retry: failed to parse config.yaml"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(run_id = %run.run_id, error = %e, "retry: failed to read config.yaml"),
            }
        }
    }

    state.registry.on_terminal(&run).await;
}

async fn get_run_status(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<GetRunStatusResponse>, ApiError> {
    let run = state
        .registry
        .get(&run_id)
        .await
        .ok_or_else(|| RpcError::NotFound(format!("run not found: {run_id}")))?;

    let error = run.error();
    if !error.is_empty() {
        tracing::debug!(run_id = %run_id, error = %error, "full run error (server-side only)");
    }

    Ok(Json(GetRunStatusResponse {
        run_id: run.run_id.clone(),
        status: run.status().into(),
        rows_written: run.rows_written(),
        duration_ms: run.duration_ms(),
        error: if error.is_empty() { error } else { rat_rpc::sanitize_error(&error) },
        archived_landing_zones: run.archived_zones(),
    }))
}

async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<CancelRunResponse>, ApiError> {
    let run = state
        .registry
        .get(&run_id)
        .await
        .ok_or_else(|| RpcError::NotFound(format!("run not found: {run_id}")))?;

    if run.is_terminal() {
        return Ok(Json(CancelRunResponse { cancelled: false }));
    }
    run.cancel.cancel();
    Ok(Json(CancelRunResponse { cancelled: true }))
}

fn to_wire(record: LogRecord) -> LogEntryWire {
    LogEntryWire {
        seq: record.seq,
        timestamp: record.timestamp,
        level: format!("{:?}", record.level).to_lowercase(),
        message: record.message,
    }
}

struct LogStreamState {
    run: Arc<RunState>,
    cursor: u64,
    queue: VecDeque<LogRecord>,
    stopped: bool,
}

fn log_event_stream(run: Arc<RunState>, cursor: u64) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = LogStreamState { run, cursor, queue: VecDeque::new(), stopped: false };
    stream::unfold(initial, |mut st| async move {
        loop {
            if st.stopped {
                return None;
            }
            if let Some(record) = st.queue.pop_front() {
                let wire = to_wire(record);
                let event = Event::default().json_data(wire).unwrap_or_else(|_| Event::default());
                return Some((Ok(event), st));
            }

            let fresh = st.run.logs_from(st.cursor);
            if !fresh.is_empty() {
                st.cursor = fresh.last().map(|r| r.seq).unwrap_or(st.cursor);
                st.queue.extend(fresh);
                continue;
            }

            if st.run.is_terminal() {
                st.stopped = true;
                return None;
            }
            st.run.wait_for_logs(Duration::from_secs(1)).await;
        }
    })
}

/// `follow=false` (the default) returns the buffered logs from `cursor` as
/// one JSON array; `follow=true` switches to an SSE stream that terminates
/// once the run reaches a terminal status, per §6's `StreamLogs` contract.
async fn stream_logs(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Query(query): Query<StreamLogsQuery>,
) -> Result<Response, ApiError> {
    let run = state
        .registry
        .get(&run_id)
        .await
        .ok_or_else(|| RpcError::NotFound(format!("run not found: {run_id}")))?;

    if !query.follow {
        let entries: Vec<LogEntryWire> = run.logs_from(query.cursor).into_iter().map(to_wire).collect();
        return Ok(Json(entries).into_response());
    }

    let stream = log_event_stream(run, query.cursor);
    Ok(Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default()).into_response())
}

async fn preview(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewPipelineRequest>,
) -> Result<Json<PreviewPipelineResponse>, ApiError> {
    let s3_config = match &req.s3_credentials {
        Some(overrides) => state.s3_config.with_overrides(overrides),
        None => state.s3_config.clone(),
    };
    let store = state
        .store_cache
        .get(&s3_config)
        .await
        .map_err(|e| RpcError::Internal(e.to_string()))?;

    let limit = req.preview_limit.filter(|&n| n > 0).unwrap_or(DEFAULT_PREVIEW_LIMIT);
    let result = preview_pipeline(
        &req.namespace,
        &req.layer.to_string(),
        &req.pipeline_name,
        &s3_config,
        &state.nessie_config,
        store.as_ref(),
        limit,
        req.code.as_deref(),
        req.pipeline_type_hint.as_deref(),
    )
    .await;

    Ok(Json(PreviewPipelineResponse {
        columns: result.columns.iter().map(|c| c.name.clone()).collect(),
        rows_sampled: result.batches.iter().map(|b| b.num_rows()).sum(),
        total_row_count: result.total_row_count,
        explain_output: result.explain_output,
        memory_peak_bytes: result.memory_peak_bytes,
        error: if result.error.is_empty() { result.error } else { rat_rpc::sanitize_error(&result.error) },
        warnings: result.warnings,
    }))
}

async fn validate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidatePipelineRequest>,
) -> Result<Json<ValidatePipelineResponse>, ApiError> {
    let result = crate::validate::validate_pipeline(&state, req).await?;
    Ok(Json(result))
}
