//! Preview execution: run a pipeline read-only with a row limit, no
//! branches, no writes, no quality tests. Used by the IDE-style editor to
//! show sample output and an execution plan before a pipeline is saved.

use std::collections::HashMap;
use std::sync::Arc;

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::datatypes::{DataType, Schema as ArrowSchema};

use rat_catalog::NessieClient;
use rat_core::{
    metadata_to_config, parse_pipeline_config, EngineConfig, NessieConfig, PipelineConfig,
    PipelineLogger, RunLogger, RunState, S3Config,
};
use rat_engine::PipelineEngine;
use rat_templating::{compile_sql, extract_landing_zones, extract_metadata, resolve_landing_zone_preview};

pub const DEFAULT_PREVIEW_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone)]
pub struct PhaseProfile {
    pub name: String,
    pub duration_ms: u64,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct PreviewResult {
    pub batches: Vec<RecordBatch>,
    pub columns: Vec<ColumnInfo>,
    pub total_row_count: usize,
    pub phases: Vec<PhaseProfile>,
    pub explain_output: String,
    pub memory_peak_bytes: u64,
    pub logs: Vec<rat_core::LogRecord>,
    pub error: String,
    pub warnings: Vec<String>,
}

enum DetectedType {
    Script,
    Sql,
}

fn columns_from_schema(schema: &ArrowSchema) -> Vec<ColumnInfo> {
    schema
        .fields()
        .iter()
        .map(|f| ColumnInfo { name: f.name().clone(), data_type: f.data_type().clone() })
        .collect()
}

async fn load_config(source: &str, prefix: &str, store: &dyn object_store::ObjectStore) -> Option<PipelineConfig> {
    let metadata = extract_metadata(source);
    if !metadata.is_empty() {
        return Some(metadata_to_config(&metadata));
    }
    let config_yaml = rat_store::read_text(store, &format!("{prefix}/config.yaml")).await.ok().flatten()?;
    parse_pipeline_config(&config_yaml).ok()
}

/// Reads source + config. `code`/`pipeline_type_hint` let a caller preview
/// unsaved edits directly instead of reading from S3; the hint defaults to
/// SQL when given inline code of an unrecognized type.
async fn detect_pipeline(
    namespace: &str,
    layer: &str,
    pipeline_name: &str,
    store: &dyn object_store::ObjectStore,
    log: &RunLogger,
    code: Option<&str>,
    pipeline_type_hint: Option<&str>,
) -> Result<(DetectedType, String, Option<PipelineConfig>), String> {
    let prefix = format!("{namespace}/pipelines/{layer}/{pipeline_name}");

    if let Some(code) = code {
        let is_script = matches!(pipeline_type_hint, Some("script") | Some("lua") | Some("python"));
        let ptype = if is_script { DetectedType::Script } else { DetectedType::Sql };
        log.info(&format!("Using inline {} code ({} chars)", if is_script { "script" } else { "sql" }, code.len()));
        let config = load_config(code, &prefix, store).await;
        return Ok((ptype, code.to_string(), config));
    }

    let script_key = format!("{prefix}/pipeline.lua");
    if let Some(source) = rat_store::read_text(store, &script_key).await.map_err(|e| e.to_string())? {
        log.info("Detected script pipeline");
        let config = load_config(&source, &prefix, store).await;
        return Ok((DetectedType::Script, source, config));
    }

    let sql_key = format!("{prefix}/pipeline.sql");
    if let Some(source) = rat_store::read_text(store, &sql_key).await.map_err(|e| e.to_string())? {
        log.info("Detected SQL pipeline");
        let config = load_config(&source, &prefix, store).await;
        return Ok((DetectedType::Sql, source, config));
    }

    Err(format!("No pipeline.lua or pipeline.sql found at {prefix}/"))
}

async fn landing_zone_overrides(
    source: &str,
    namespace: &str,
    s3_config: &S3Config,
    store: &dyn object_store::ObjectStore,
    warnings: &mut Vec<String>,
) -> HashMap<String, String> {
    let mut overrides = HashMap::new();
    for zone in extract_landing_zones(source) {
        let resolved = resolve_landing_zone_preview(&zone, namespace, s3_config, store, warnings).await;
        overrides.insert(zone, resolved);
    }
    overrides
}

async fn preview_sql(
    source: &str,
    namespace: &str,
    layer: &str,
    pipeline_name: &str,
    s3_config: &S3Config,
    nessie_client: &NessieClient,
    config: Option<&PipelineConfig>,
    engine: &PipelineEngine,
    store: &dyn object_store::ObjectStore,
    log: &RunLogger,
    result: &mut PreviewResult,
    preview_limit: usize,
) {
    let t0 = std::time::Instant::now();
    let overrides = landing_zone_overrides(source, namespace, s3_config, store, &mut result.warnings).await;
    let compiled_sql = match compile_sql(source, namespace, layer, pipeline_name, s3_config, nessie_client, config, None, Some(&overrides)).await {
        Ok(sql) => sql,
        Err(e) => {
            result.error = format!("SQL compilation failed: {e}");
            return;
        }
    };
    result.phases.push(PhaseProfile { name: "compile".to_string(), duration_ms: t0.elapsed().as_millis() as u64, metadata: HashMap::new() });
    log.info("SQL compiled");

    let t0 = std::time::Instant::now();
    let limited_sql = format!("SELECT * FROM ({compiled_sql}) AS _preview LIMIT {preview_limit}");
    let batches = match engine.query_arrow(&limited_sql).await {
        Ok(b) => b,
        Err(e) => {
            result.error = format!("Query execution failed: {e}");
            return;
        }
    };
    let mut metadata = HashMap::new();
    metadata.insert("limit".to_string(), preview_limit.to_string());
    result.phases.push(PhaseProfile { name: "execute".to_string(), duration_ms: t0.elapsed().as_millis() as u64, metadata });

    let row_count: usize = batches.iter().map(|b| b.num_rows()).sum();
    result.columns = batches.first().map(|b| columns_from_schema(&b.schema())).unwrap_or_default();
    log.info(&format!("Executed with LIMIT {preview_limit}: {row_count} rows"));
    result.batches = batches;

    let t0 = std::time::Instant::now();
    match engine.explain_analyze(&limited_sql).await {
        Ok(text) => result.explain_output = text,
        Err(e) => {
            result.warnings.push(format!("EXPLAIN ANALYZE failed: {e}"));
            log.warn(&format!("EXPLAIN ANALYZE failed: {e}"));
        }
    }
    result.phases.push(PhaseProfile { name: "explain".to_string(), duration_ms: t0.elapsed().as_millis() as u64, metadata: HashMap::new() });

    let t0 = std::time::Instant::now();
    if row_count < preview_limit {
        result.total_row_count = row_count;
    } else {
        match engine.query_arrow(&format!("SELECT COUNT(*) FROM ({compiled_sql}) AS _count")).await {
            Ok(count_batches) => {
                let total = count_batches
                    .first()
                    .and_then(|b| b.column(0).as_any().downcast_ref::<datafusion::arrow::array::Int64Array>().map(|a| a.value(0) as usize))
                    .unwrap_or(row_count);
                result.total_row_count = total;
            }
            Err(e) => {
                result.warnings.push(format!("COUNT(*) failed: {e}"));
                result.total_row_count = row_count;
                log.warn(&format!("COUNT(*) failed: {e}"));
            }
        }
    }
    result.phases.push(PhaseProfile { name: "count".to_string(), duration_ms: t0.elapsed().as_millis() as u64, metadata: HashMap::new() });
    log.info(&format!("Total row count: {}", result.total_row_count));
}

#[allow(clippy::too_many_arguments)]
async fn preview_script(
    source: &str,
    namespace: &str,
    layer: &str,
    pipeline_name: &str,
    s3_config: &S3Config,
    nessie_config: &NessieConfig,
    config: Option<&PipelineConfig>,
    engine: Arc<PipelineEngine>,
    log: &RunLogger,
    result: &mut PreviewResult,
    preview_limit: usize,
) {
    result.phases.push(PhaseProfile {
        name: "compile".to_string(),
        duration_ms: 0,
        metadata: HashMap::from([("skipped".to_string(), "script".to_string())]),
    });

    let t0 = std::time::Instant::now();
    let run_started_at = chrono::Utc::now().to_rfc3339();
    let batches = match rat_sandbox::execute_script_pipeline(
        source,
        engine,
        namespace,
        layer,
        pipeline_name,
        s3_config.clone(),
        Arc::new(NessieClient::new(nessie_config.clone())),
        config,
        &run_started_at,
        None,
    )
    .await
    {
        Ok(b) => b,
        Err(e) => {
            result.error = format!("Script execution failed: {e}");
            return;
        }
    };
    let mut metadata = HashMap::new();
    metadata.insert("limit".to_string(), preview_limit.to_string());
    result.phases.push(PhaseProfile { name: "execute".to_string(), duration_ms: t0.elapsed().as_millis() as u64, metadata });

    let total: usize = batches.iter().map(|b| b.num_rows()).sum();
    let limited = take_rows(&batches, preview_limit);
    result.columns = limited.first().map(|b| columns_from_schema(&b.schema())).unwrap_or_default();
    result.total_row_count = total;
    log.info(&format!("Executed script pipeline: {} rows (total: {total})", limited.iter().map(|b| b.num_rows()).sum::<usize>()));
    result.batches = limited;

    result.phases.push(PhaseProfile {
        name: "explain".to_string(),
        duration_ms: 0,
        metadata: HashMap::from([("skipped".to_string(), "script".to_string())]),
    });
    result.phases.push(PhaseProfile { name: "count".to_string(), duration_ms: 0, metadata: HashMap::new() });
}

fn take_rows(batches: &[RecordBatch], limit: usize) -> Vec<RecordBatch> {
    let mut out = Vec::new();
    let mut remaining = limit;
    for batch in batches {
        if remaining == 0 {
            break;
        }
        if batch.num_rows() <= remaining {
            remaining -= batch.num_rows();
            out.push(batch.clone());
        } else {
            out.push(batch.slice(0, remaining));
            remaining = 0;
        }
    }
    out
}

/// Execute a pipeline in preview mode: no ephemeral branch, no Iceberg
/// write, no quality tests. Never returns an `Err` — every failure is
/// captured on `PreviewResult.error` so the caller always gets back
/// whatever logs and partial state were collected.
#[allow(clippy::too_many_arguments)]
pub async fn preview_pipeline(
    namespace: &str,
    layer: &str,
    pipeline_name: &str,
    s3_config: &S3Config,
    nessie_config: &NessieConfig,
    store: &dyn object_store::ObjectStore,
    preview_limit: usize,
    code: Option<&str>,
    pipeline_type_hint: Option<&str>,
) -> PreviewResult {
    let run_state = Arc::new(RunState::new("preview", namespace, layer, pipeline_name, "preview"));
    let log = RunLogger::new(run_state.clone());
    let mut result = PreviewResult::default();

    log.info(&format!("Starting preview for {namespace}/{layer}/{pipeline_name}"));

    let engine_config = match EngineConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            result.error = e.to_string();
            log.error(&format!("Preview failed: {e}"));
            result.logs = run_state.all_logs();
            return result;
        }
    };
    let engine = match PipelineEngine::new(s3_config, &engine_config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            result.error = e.to_string();
            log.error(&format!("Preview failed: {e}"));
            result.logs = run_state.all_logs();
            return result;
        }
    };

    let detected = detect_pipeline(namespace, layer, pipeline_name, store, &log, code, pipeline_type_hint).await;
    match detected {
        Ok((detected_type, source, config)) => {
            let type_label = match detected_type {
                DetectedType::Script => "script",
                DetectedType::Sql => "sql",
            };
            result.phases.push(PhaseProfile {
                name: "detect".to_string(),
                duration_ms: 0,
                metadata: HashMap::from([("pipeline_type".to_string(), type_label.to_string())]),
            });

            let nessie_client = NessieClient::new(nessie_config.clone());
            match detected_type {
                DetectedType::Sql => {
                    preview_sql(&source, namespace, layer, pipeline_name, s3_config, &nessie_client, config.as_ref(), &engine, store, &log, &mut result, preview_limit).await;
                }
                DetectedType::Script => {
                    preview_script(&source, namespace, layer, pipeline_name, s3_config, nessie_config, config.as_ref(), engine.clone(), &log, &mut result, preview_limit).await;
                }
            }

            if result.error.is_empty() {
                log.info("Preview completed successfully");
            } else {
                log.error(&format!("Preview failed: {}", result.error));
            }
        }
        Err(e) => {
            result.error = e.clone();
            log.error(&format!("Preview failed: {e}"));
        }
    }

    let stats = engine.memory_stats();
    result.memory_peak_bytes = stats.get("memory_usage").copied().unwrap_or(0) as u64;
    result.logs = run_state.all_logs();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_rows_stops_at_limit_across_batches() {
        use datafusion::arrow::array::Int32Array;
        use datafusion::arrow::datatypes::{DataType, Field, Schema};

        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int32, false)]));
        let b1 = RecordBatch::try_new(schema.clone(), vec![Arc::new(Int32Array::from(vec![1, 2, 3]))]).unwrap();
        let b2 = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![4, 5, 6]))]).unwrap();

        let limited = take_rows(&[b1, b2], 4);
        let total: usize = limited.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn take_rows_with_limit_above_total_returns_everything() {
        use datafusion::arrow::array::Int32Array;
        use datafusion::arrow::datatypes::{DataType, Field, Schema};

        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int32, false)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![1, 2]))]).unwrap();
        let limited = take_rows(&[batch], 100);
        let total: usize = limited.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 2);
    }
}
