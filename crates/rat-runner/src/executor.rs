//! Pipeline executor — orchestrates the full pipeline lifecycle.
//!
//! Execution flow:
//!   Phase 0: Create ephemeral Nessie branch
//!   Phase 1: Detect pipeline type (.sql first is not how source detection
//!            works here — script first, then SQL, matching the original's
//!            "richer source type wins" priority), read config.yaml
//!   Phase 2: Build result table (SQL template or script path)
//!   Phase 3: Write to Iceberg via the configured merge strategy
//!   Phase 4: Quality tests on the ephemeral branch
//!   Phase 5: Branch resolution (merge or delete based on quality results)

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::datatypes::Schema as ArrowSchema;
use datafusion::datasource::MemTable;
use object_store::ObjectStore;

use rat_core::{
    merge_configs, parse_pipeline_config, EngineConfig, MergeStrategy, NessieConfig, PipelineConfig,
    PipelineLogger, QualityTestResult, RunLogger, RunState, RunStatus, S3Config,
};
use rat_catalog::NessieClient;
use rat_engine::PipelineEngine;
use rat_iceberg::{ensure_namespace, get_catalog, read_watermark, split_table_ident, table_ident, write_with_strategy};
use rat_store::StoreClientCache;
use rat_templating::{
    compile_sql, extract_landing_zones, extract_metadata, validate_landing_zones, validate_template,
};

use crate::error::ExecutorError;
use crate::maintenance::run_maintenance;

const NEW_DATA_VIEW: &str = "__rat_new_data";

fn store_cache() -> &'static StoreClientCache {
    static CACHE: OnceLock<StoreClientCache> = OnceLock::new();
    CACHE.get_or_init(StoreClientCache::default)
}

/// Inputs threaded through `execute_pipeline` and a retry that re-enters it.
pub struct PipelineRunInputs {
    pub s3_config: S3Config,
    pub nessie_config: NessieConfig,
    pub published_versions: Option<BTreeMap<String, String>>,
}

enum PipelineType {
    Script,
    Sql,
}

struct Ctx {
    run: Arc<RunState>,
    s3_config: S3Config,
    nessie_config: NessieConfig,
    log: RunLogger,
    published_versions: Option<BTreeMap<String, String>>,

    branch_name: String,
    branch_created: bool,

    pipeline_type: PipelineType,
    source: String,
    config: Option<PipelineConfig>,

    engine: Option<Arc<PipelineEngine>>,
    table_name: String,

    result: Vec<RecordBatch>,
    row_count: usize,
}

fn check_cancelled(run: &RunState) -> Result<(), ExecutorError> {
    if run.cancel.is_cancelled() {
        return Err(ExecutorError::Cancelled);
    }
    Ok(())
}

async fn read_versioned(store: &dyn ObjectStore, key: &str, published_versions: &Option<BTreeMap<String, String>>) -> Result<Option<String>, ExecutorError> {
    match published_versions.as_ref().and_then(|v| v.get(key)) {
        Some(version_id) => Ok(rat_store::read_text_version(store, key, version_id).await?),
        None => Ok(rat_store::read_text(store, key).await?),
    }
}

// ── Phase 0: ephemeral Nessie branch ─────────────────────────────────

async fn phase0_create_branch(ctx: &mut Ctx, nessie_client: &NessieClient) -> Result<(), ExecutorError> {
    check_cancelled(&ctx.run)?;
    ctx.branch_name = format!("run-{}", ctx.run.run_id);
    ctx.log.info(&format!("Creating ephemeral branch '{}'", ctx.branch_name));

    match nessie_client.create_branch(&ctx.branch_name, "main").await {
        Ok(_) => {
            ctx.branch_created = true;
            ctx.run.set_branch(ctx.branch_name.clone());
            ctx.log.info(&format!("Branch '{}' created", ctx.branch_name));
        }
        Err(e) => {
            ctx.log.warn(&format!("Branch creation failed ({e}), writing to main"));
            ctx.branch_name = "main".to_string();
            ctx.run.set_branch("main");
        }
    }
    Ok(())
}

// ── Phase 1: detect pipeline type + load config ──────────────────────

async fn phase1_detect_and_load(ctx: &mut Ctx, store: &dyn ObjectStore) -> Result<(), ExecutorError> {
    check_cancelled(&ctx.run)?;
    let (ns, layer, name) = (ctx.run.namespace.clone(), ctx.run.layer.clone(), ctx.run.pipeline_name.clone());
    let base_prefix = format!("{ns}/pipelines/{layer}/{name}");

    let script_key = format!("{base_prefix}/pipeline.lua");
    let sql_key = format!("{base_prefix}/pipeline.sql");
    let config_key = format!("{base_prefix}/config.yaml");

    let raw_script = read_versioned(store, &script_key, &ctx.published_versions).await?;
    let raw_sql = if raw_script.is_none() {
        read_versioned(store, &sql_key, &ctx.published_versions).await?
    } else {
        None
    };

    let source = match (&raw_script, &raw_sql) {
        (Some(s), _) => {
            ctx.pipeline_type = PipelineType::Script;
            s.clone()
        }
        (None, Some(s)) => {
            ctx.pipeline_type = PipelineType::Sql;
            s.clone()
        }
        (None, None) => return Err(ExecutorError::PipelineNotFound(script_key, sql_key)),
    };
    ctx.log.info(&format!(
        "Detected {} pipeline",
        match ctx.pipeline_type {
            PipelineType::Script => "script",
            PipelineType::Sql => "sql",
        }
    ));
    ctx.source = source.clone();

    let annotation_meta = extract_metadata(&source);
    let config_yaml = read_versioned(store, &config_key, &ctx.published_versions).await?;
    let base_config = config_yaml.as_deref().map(parse_pipeline_config).transpose()?;

    if !annotation_meta.is_empty() || base_config.is_some() {
        let merged = merge_configs(base_config.clone().unwrap_or_default(), &annotation_meta);
        ctx.config = Some(merged);
        if !annotation_meta.is_empty() && base_config.is_some() {
            ctx.log.info(&format!("Merged config.yaml + annotations: {:?}", annotation_meta.keys().collect::<Vec<_>>()));
        } else if !annotation_meta.is_empty() {
            ctx.log.info(&format!("Loaded config from source annotations: {:?}", annotation_meta.keys().collect::<Vec<_>>()));
        } else {
            ctx.log.info("Loaded pipeline config from config.yaml");
        }
    }

    let (errors, warnings) = validate_template(&source);
    for e in &errors {
        ctx.log.warn(e);
    }
    for w in &warnings {
        ctx.log.warn(w);
    }

    let lz_warnings = validate_landing_zones(&source, &ns, &ctx.s3_config, store).await?;
    for w in lz_warnings {
        ctx.log.warn(&w);
    }

    Ok(())
}

// ── Phase 2: build result ────────────────────────────────────────────

async fn phase2_build_result(ctx: &mut Ctx, nessie_client: &NessieClient) -> Result<(), ExecutorError> {
    check_cancelled(&ctx.run)?;
    let (ns, layer, name) = (ctx.run.namespace.clone(), ctx.run.layer.clone(), ctx.run.pipeline_name.clone());

    let engine_config = EngineConfig::from_env()?;
    let engine = Arc::new(PipelineEngine::new(&ctx.s3_config, &engine_config)?);
    ctx.table_name = format!("{ns}.{layer}.{name}");

    let result = match ctx.pipeline_type {
        PipelineType::Script => {
            ctx.log.info("Executing script pipeline");
            let run_started_at = chrono::Utc::now().to_rfc3339();
            rat_sandbox::execute_script_pipeline(
                &ctx.source,
                engine.clone(),
                &ns,
                &layer,
                &name,
                ctx.s3_config.clone(),
                Arc::new(NessieClient::new(ctx.nessie_config.clone())),
                ctx.config.as_ref(),
                &run_started_at,
                None,
            )
            .await?
        }
        PipelineType::Sql => execute_sql_path(ctx, &engine, nessie_client).await?,
    };
    ctx.engine = Some(engine);

    ctx.row_count = result.iter().map(|b| b.num_rows()).sum();
    ctx.log.info(&format!("Query returned {} rows", ctx.row_count));
    ctx.result = result;
    Ok(())
}

async fn execute_sql_path(ctx: &Ctx, engine: &PipelineEngine, nessie_client: &NessieClient) -> Result<Vec<RecordBatch>, ExecutorError> {
    let mut watermark_value: Option<String> = None;
    if let Some(config) = &ctx.config {
        let needs_watermark = matches!(config.merge_strategy, MergeStrategy::Incremental | MergeStrategy::DeleteInsert)
            && !config.watermark_column.is_empty();
        if needs_watermark {
            ctx.log.info(&format!("Reading watermark for column '{}'", config.watermark_column));
            let ident = table_ident(&ctx.table_name)?;
            let main_catalog = get_catalog(&ctx.s3_config, &ctx.nessie_config, "main");
            watermark_value = read_watermark(&main_catalog, engine, &ident, &config.watermark_column).await?;
            match &watermark_value {
                Some(v) => ctx.log.info(&format!("Watermark value: {v}")),
                None => ctx.log.info("No watermark found (first run or empty table)"),
            }
        }
    }

    ctx.log.info("Compiling SQL template");
    let compiled_sql = compile_sql(
        &ctx.source,
        &ctx.run.namespace,
        &ctx.run.layer,
        &ctx.run.pipeline_name,
        &ctx.s3_config,
        nessie_client,
        ctx.config.as_ref(),
        watermark_value.as_deref(),
        None,
    )
    .await?;
    ctx.log.debug(&format!("Compiled SQL:\n{compiled_sql}"));

    ctx.log.info("Executing SQL via the query engine");
    Ok(engine.query_arrow(&compiled_sql).await?)
}

// ── Phase 3: write to Iceberg ─────────────────────────────────────────

async fn phase3_write_iceberg(ctx: &mut Ctx) -> Result<(), ExecutorError> {
    check_cancelled(&ctx.run)?;

    if ctx.row_count == 0 {
        ctx.log.info("Zero rows — skipping Iceberg write");
        ctx.run.set_rows_written(0);
        return Ok(());
    }

    let engine = ctx.engine.as_ref().expect("engine set in phase 2");
    let schema: Arc<ArrowSchema> = ctx.result.first().map(|b| b.schema()).unwrap_or_else(|| Arc::new(ArrowSchema::empty()));
    let mem_table = MemTable::try_new(schema, vec![ctx.result.clone()])?;
    engine.session().deregister_table(NEW_DATA_VIEW).ok();
    engine.session().register_table(NEW_DATA_VIEW, Arc::new(mem_table))?;

    let config = ctx.config.clone().unwrap_or_default();
    let strategy = config.merge_strategy;
    let catalog = get_catalog(&ctx.s3_config, &ctx.nessie_config, &ctx.branch_name);
    let run_started_at = chrono::Utc::now().to_rfc3339();

    let (table_namespace, _) = split_table_ident(&ctx.table_name)?;
    ensure_namespace(&catalog, &table_namespace).await?;

    ctx.log.info(&format!("Writing {} rows to Iceberg table {} (strategy: {strategy})", ctx.row_count, ctx.table_name));
    write_with_strategy(engine, &catalog, &ctx.table_name, NEW_DATA_VIEW, &config, &run_started_at).await?;

    // `write_with_strategy` doesn't return a row count the way each Python
    // per-strategy function does — this records the Phase 2 query's row
    // count (new rows produced) rather than the post-merge table total.
    ctx.run.set_rows_written(ctx.row_count as u64);
    ctx.log.info("Iceberg write complete");
    Ok(())
}

// ── Phase 4: quality tests ────────────────────────────────────────────

fn format_quality_error(results: &[QualityTestResult]) -> String {
    let failed: Vec<&QualityTestResult> = results
        .iter()
        .filter(|r| r.severity == "error" && (r.status == "fail" || r.status == "error"))
        .collect();
    let mut lines = vec!["Quality tests failed:".to_string()];
    for r in failed {
        let mut label = format!("  {}", r.test_name);
        if !r.description.is_empty() {
            label.push_str(&format!(" ({})", r.description));
        }
        if r.status == "error" {
            lines.push(format!("{label}: errored — {}", r.message));
        } else {
            lines.push(format!("{label}: {} violation(s)", r.row_count));
        }
        for row_line in r.sample_rows.lines() {
            lines.push(format!("    {row_line}"));
        }
    }
    lines.join("\n")
}

async fn phase4_quality_tests(ctx: &Ctx, store: &dyn ObjectStore, nessie_client: &NessieClient) -> Result<Vec<QualityTestResult>, ExecutorError> {
    check_cancelled(&ctx.run)?;
    let engine = ctx.engine.as_ref().expect("engine set in phase 2");
    let results = rat_quality::run_quality_tests(
        &ctx.run,
        engine,
        store,
        &ctx.s3_config,
        nessie_client,
        &ctx.log,
        ctx.published_versions.as_ref(),
    )
    .await?;
    ctx.run.set_quality_results(results.clone());
    Ok(results)
}

// ── Phase 5: branch resolution ────────────────────────────────────────

async fn archive_landing_zones(ctx: &Ctx, store: &dyn ObjectStore) -> Vec<String> {
    let zones = extract_landing_zones(&ctx.source);
    let mut archived = Vec::new();
    for zone in zones {
        let prefix = format!("{}/landing/{zone}/", ctx.run.namespace);
        let dest_prefix = format!("{}/landing/{zone}/_processed/{}/", ctx.run.namespace, ctx.run.run_id);
        match rat_store::list_keys(store, &prefix, None).await {
            Ok(keys) => {
                let keys: Vec<String> = keys.into_iter().filter(|k| !k.contains("/_processed/")).collect();
                if keys.is_empty() {
                    ctx.log.info(&format!("No files to archive in landing zone '{zone}'"));
                    continue;
                }
                match rat_store::move_keys(store, &keys, &prefix, &dest_prefix).await {
                    Ok(()) => {
                        ctx.log.info(&format!("Archived {} file(s) from landing zone '{zone}'", keys.len()));
                        archived.push(format!("{}/{zone}", ctx.run.namespace));
                    }
                    Err(e) => ctx.log.warn(&format!("Failed to archive landing zone '{zone}': {e}")),
                }
            }
            Err(e) => ctx.log.warn(&format!("Failed to archive landing zone '{zone}': {e}")),
        }
    }
    archived
}

async fn post_success(ctx: &Ctx, store: &dyn ObjectStore) {
    ctx.run.set_status(RunStatus::Success);
    ctx.log.info("Pipeline completed successfully");

    if ctx.config.as_ref().map(|c| c.archive_landing_zones).unwrap_or(false) {
        let archived = archive_landing_zones(ctx, store).await;
        ctx.run.set_archived_zones(archived);
    }

    if ctx.row_count > 0 {
        run_maintenance(&ctx.table_name, &ctx.s3_config, &ctx.nessie_config, store, &ctx.log).await;
    }
}

async fn resolve_with_branch(ctx: &Ctx, quality_results: &[QualityTestResult], nessie_client: &NessieClient, store: &dyn ObjectStore) {
    if rat_quality::has_error_failures(quality_results) {
        ctx.log.error("Quality tests failed — discarding branch (no data on main)");
        if let Err(e) = nessie_client.delete_branch(&ctx.branch_name).await {
            ctx.log.warn(&format!("Failed to delete branch: {e}"));
        }
        ctx.run.set_status(RunStatus::Failed);
        ctx.run.set_error(format_quality_error(quality_results));
        return;
    }

    ctx.log.info(&format!("Merging branch '{}' to main", ctx.branch_name));
    match nessie_client.merge_branch(&ctx.branch_name, "main").await {
        Ok(()) => {
            ctx.log.info("Branch merged to main");
            post_success(ctx, store).await;
        }
        Err(e) => {
            ctx.log.error(&format!("Branch merge failed: {e}"));
            ctx.run.set_status(RunStatus::Failed);
            ctx.run.set_error(format!("Branch merge failed: {e}"));
        }
    }
}

async fn resolve_without_branch(ctx: &Ctx, quality_results: &[QualityTestResult], store: &dyn ObjectStore) {
    if rat_quality::has_error_failures(quality_results) {
        ctx.run.set_status(RunStatus::Failed);
        ctx.run.set_error(format_quality_error(quality_results));
        ctx.log.error("Quality tests failed (data already on main — no rollback available)");
        return;
    }
    post_success(ctx, store).await;
}

async fn phase5_resolve_branch(ctx: &Ctx, quality_results: &[QualityTestResult], nessie_client: &NessieClient, store: &dyn ObjectStore) {
    if ctx.branch_created {
        resolve_with_branch(ctx, quality_results, nessie_client, store).await;
    } else {
        resolve_without_branch(ctx, quality_results, store).await;
    }
}

// ── Public entry point ────────────────────────────────────────────────

/// Execute a pipeline run, updating `run` in place with status,
/// `rows_written`, `duration_ms`, and `error`. Intended to run inside a
/// spawned worker task, one per run.
pub async fn execute_pipeline(run: &Arc<RunState>, inputs: &PipelineRunInputs) {
    let log = RunLogger::new(run.clone());
    let start = std::time::Instant::now();
    run.set_status(RunStatus::Running);

    let env = run.env();
    let s3_config = if env.is_empty() { inputs.s3_config.clone() } else { inputs.s3_config.with_overrides(&env) };

    let store = match store_cache().get(&s3_config).await {
        Ok(store) => store,
        Err(e) => {
            run.set_status(RunStatus::Failed);
            run.set_error(e.to_string());
            log.error(&format!("Pipeline failed: {e}"));
            run.set_duration_ms(start.elapsed().as_millis() as u64);
            return;
        }
    };
    let nessie_client = NessieClient::new(inputs.nessie_config.clone());

    let mut ctx = Ctx {
        run: run.clone(),
        s3_config,
        nessie_config: inputs.nessie_config.clone(),
        log,
        published_versions: inputs.published_versions.clone(),
        branch_name: String::new(),
        branch_created: false,
        pipeline_type: PipelineType::Sql,
        source: String::new(),
        config: None,
        engine: None,
        table_name: String::new(),
        result: Vec::new(),
        row_count: 0,
    };

    let outcome: Result<(), ExecutorError> = async {
        phase0_create_branch(&mut ctx, &nessie_client).await?;
        phase1_detect_and_load(&mut ctx, store.as_ref()).await?;
        phase2_build_result(&mut ctx, &nessie_client).await?;
        phase3_write_iceberg(&mut ctx).await?;
        let quality_results = phase4_quality_tests(&ctx, store.as_ref(), &nessie_client).await?;
        phase5_resolve_branch(&ctx, &quality_results, &nessie_client, store.as_ref()).await;
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {}
        Err(ExecutorError::Cancelled) => {
            run.set_status(RunStatus::Cancelled);
            run.set_error("Run cancelled by user");
            ctx.log.warn("Pipeline cancelled");
        }
        Err(e) => {
            run.set_status(RunStatus::Failed);
            run.set_error(e.to_string());
            ctx.log.error(&format!("Pipeline failed: {e}"));
        }
    }

    if ctx.branch_created && ctx.branch_name != "main" {
        if let Err(e) = nessie_client.delete_branch(&ctx.branch_name).await {
            tracing::warn!(run_id = %run.run_id, branch = %ctx.branch_name, error = %e, "failed to delete ephemeral branch");
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    run.set_duration_ms(elapsed_ms);
    ctx.log.info(&format!("Duration: {elapsed_ms}ms"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_quality_error_includes_sample_rows() {
        let results = vec![QualityTestResult {
            test_name: "no_nulls".to_string(),
            test_file: "tests/quality/no_nulls.sql".to_string(),
            severity: "error".to_string(),
            status: "fail".to_string(),
            row_count: 2,
            message: "2 violation(s)".to_string(),
            duration_ms: 5,
            description: "checks for nulls".to_string(),
            compiled_sql: String::new(),
            sample_rows: "| id |\n| 1  |".to_string(),
            tags: vec![],
            remediation: String::new(),
        }];
        let msg = format_quality_error(&results);
        assert!(msg.contains("no_nulls"));
        assert!(msg.contains("2 violation(s)"));
        assert!(msg.contains("| id |"));
    }

    #[test]
    fn format_quality_error_skips_warn_severity() {
        let results = vec![QualityTestResult {
            test_name: "soft_check".to_string(),
            test_file: String::new(),
            severity: "warn".to_string(),
            status: "fail".to_string(),
            row_count: 1,
            message: String::new(),
            duration_ms: 1,
            description: String::new(),
            compiled_sql: String::new(),
            sample_rows: String::new(),
            tags: vec![],
            remediation: String::new(),
        }];
        let msg = format_quality_error(&results);
        assert!(!msg.contains("soft_check"));
    }
}
