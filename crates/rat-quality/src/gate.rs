//! Quality test discovery and execution — post-write validation run on the
//! ephemeral branch before it gets merged into the pipeline's target
//! branch.

use std::collections::BTreeMap;
use std::time::Instant;

use object_store::ObjectStore;
use rat_core::{PipelineLogger, QualityTestResult, RunState, S3Config};
use rat_catalog::NessieClient;
use rat_engine::PipelineEngine;

use crate::annotations::{parse_description, parse_remediation, parse_severity, parse_tags};
use crate::error::QualityError;
use crate::sample::{format_sample_rows, total_row_count};

/// Discover quality test keys from the publish map, rather than listing the
/// bucket directly — a test only runs once it has been published at a
/// pinned version, so discovery and version pinning share the same source
/// of truth.
pub fn discover_quality_tests_versioned(
    published_versions: &BTreeMap<String, String>,
    namespace: &str,
    layer: &str,
    name: &str,
) -> Vec<String> {
    let prefix = format!("{namespace}/pipelines/{layer}/{name}/tests/quality/");
    let mut keys: Vec<String> = published_versions
        .keys()
        .filter(|k| k.starts_with(&prefix) && k.ends_with(".sql"))
        .cloned()
        .collect();
    keys.sort();
    keys
}

fn test_name_from_key(key: &str) -> String {
    key.rsplit('/')
        .next()
        .unwrap_or(key)
        .trim_end_matches(".sql")
        .to_string()
}

/// Run a single quality test SQL file. A quality test's SQL selects
/// violation rows: zero rows is a pass, any row is a failure, and a
/// compile/execution error is reported as its own `"error"` status rather
/// than bubbling up and aborting the rest of the gate.
#[allow(clippy::too_many_arguments)]
pub async fn run_quality_test(
    sql: &str,
    key: &str,
    engine: &PipelineEngine,
    namespace: &str,
    layer: &str,
    pipeline_name: &str,
    s3_config: &S3Config,
    nessie_client: &NessieClient,
    log: &dyn PipelineLogger,
) -> QualityTestResult {
    let test_name = test_name_from_key(key);
    let severity = parse_severity(sql);
    let description = parse_description(sql);
    let tags = parse_tags(sql);
    let remediation = parse_remediation(sql);

    let start = Instant::now();
    let compiled = match rat_templating::compile_sql(
        sql,
        namespace,
        layer,
        pipeline_name,
        s3_config,
        nessie_client,
        None,
        None,
        None,
    )
    .await
    {
        Ok(c) => c,
        Err(e) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            log.error(&format!("Quality test '{test_name}' errored: {e}"));
            return QualityTestResult {
                test_name,
                test_file: key.to_string(),
                severity,
                status: "error".to_string(),
                row_count: 0,
                message: e.to_string(),
                duration_ms: elapsed_ms,
                description,
                compiled_sql: String::new(),
                sample_rows: String::new(),
                tags,
                remediation,
            };
        }
    };
    log.debug(&format!("Quality test '{test_name}' SQL:\n{compiled}"));

    match engine.query_arrow(&compiled).await {
        Ok(batches) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            let row_count = total_row_count(&batches);
            let status = if row_count == 0 { "pass" } else { "fail" };
            let message = if status == "pass" {
                String::new()
            } else {
                format!("{row_count} violation(s) found")
            };

            let sample = if status == "fail" {
                match format_sample_rows(&batches) {
                    Ok(s) => s,
                    Err(e) => {
                        log.warn(&format!("Quality test '{test_name}': could not render sample rows: {e}"));
                        String::new()
                    }
                }
            } else {
                String::new()
            };

            if status == "fail" {
                log.warn(&format!("Quality test '{test_name}': {status} ({row_count} rows, {elapsed_ms}ms)"));
                log.warn(&format!("Sample violations for '{test_name}':\n{sample}"));
            } else {
                log.info(&format!("Quality test '{test_name}': {status} ({row_count} rows, {elapsed_ms}ms)"));
            }
            if !description.is_empty() {
                log.info(&format!("Quality test '{test_name}' description: {description}"));
            }

            QualityTestResult {
                test_name,
                test_file: key.to_string(),
                severity,
                status: status.to_string(),
                row_count,
                message,
                duration_ms: elapsed_ms,
                description,
                compiled_sql: compiled,
                sample_rows: sample,
                tags,
                remediation,
            }
        }
        Err(e) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            log.error(&format!("Quality test '{test_name}' errored: {e}"));
            QualityTestResult {
                test_name,
                test_file: key.to_string(),
                severity,
                status: "error".to_string(),
                row_count: 0,
                message: e.to_string(),
                duration_ms: elapsed_ms,
                description,
                compiled_sql: compiled,
                sample_rows: String::new(),
                tags,
                remediation,
            }
        }
    }
}

/// Discover and run every quality test for a pipeline.
///
/// `published_versions` is `None` when the pipeline has never been
/// published — in that case the gate is a no-op rather than a blanket
/// failure, since there is nothing pinned yet to run. Once published, only
/// tests present in the publish map run, read at their pinned version.
#[allow(clippy::too_many_arguments)]
pub async fn run_quality_tests(
    run: &RunState,
    engine: &PipelineEngine,
    store: &dyn ObjectStore,
    s3_config: &S3Config,
    nessie_client: &NessieClient,
    log: &dyn PipelineLogger,
    published_versions: Option<&BTreeMap<String, String>>,
) -> Result<Vec<QualityTestResult>, QualityError> {
    let Some(published_versions) = published_versions else {
        log.info("Pipeline not published — skipping quality tests");
        return Ok(Vec::new());
    };

    let keys = discover_quality_tests_versioned(
        published_versions,
        &run.namespace,
        &run.layer,
        &run.pipeline_name,
    );
    if keys.is_empty() {
        log.info("No quality tests found — skipping");
        return Ok(Vec::new());
    }

    log.info(&format!("Found {} quality test(s)", keys.len()));
    let mut results = Vec::with_capacity(keys.len());
    for key in &keys {
        let sql = match published_versions.get(key) {
            Some(version_id) => rat_store::read_text_version(store, key, version_id).await?,
            None => rat_store::read_text(store, key).await?,
        };
        let Some(sql) = sql else { continue };
        let result = run_quality_test(
            &sql,
            key,
            engine,
            &run.namespace,
            &run.layer,
            &run.pipeline_name,
            s3_config,
            nessie_client,
            log,
        )
        .await;
        results.push(result);
    }

    if !results.is_empty() {
        let passed = results.iter().filter(|r| r.status == "pass").count();
        let failed = results.iter().filter(|r| r.status == "fail").count();
        let errored = results.iter().filter(|r| r.status == "error").count();
        log.info(&format!("Quality results: {passed} passed, {failed} failed, {errored} errored"));
        for r in &results {
            if r.status != "pass" {
                let line = format!("  [{}] {}: {} — {}", r.severity, r.test_name, r.status, r.message);
                if r.severity == "error" {
                    log.error(&line);
                } else {
                    log.warn(&line);
                }
            }
        }
    }

    Ok(results)
}

/// A gate fails iff at least one `error`-severity test failed or errored.
/// `warn`-severity failures are logged but never block a merge.
pub fn has_error_failures(results: &[QualityTestResult]) -> bool {
    results
        .iter()
        .any(|r| r.severity == "error" && (r.status == "fail" || r.status == "error"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(keys: &[&str]) -> BTreeMap<String, String> {
        keys.iter().map(|k| (k.to_string(), "v1".to_string())).collect()
    }

    #[test]
    fn discovers_only_keys_under_the_pipeline_prefix() {
        let published = versions(&[
            "acme/pipelines/silver/orders/tests/quality/not_null.sql",
            "acme/pipelines/silver/orders/tests/quality/unique.sql",
            "acme/pipelines/silver/other/tests/quality/not_null.sql",
            "acme/pipelines/silver/orders/model.sql",
        ]);
        let found = discover_quality_tests_versioned(&published, "acme", "silver", "orders");
        assert_eq!(
            found,
            vec![
                "acme/pipelines/silver/orders/tests/quality/not_null.sql".to_string(),
                "acme/pipelines/silver/orders/tests/quality/unique.sql".to_string(),
            ]
        );
    }

    #[test]
    fn returns_empty_when_nothing_published_under_prefix() {
        let published = versions(&["acme/pipelines/silver/orders/model.sql"]);
        assert!(discover_quality_tests_versioned(&published, "acme", "silver", "orders").is_empty());
    }

    #[test]
    fn test_name_strips_directory_and_extension() {
        assert_eq!(
            test_name_from_key("acme/pipelines/silver/orders/tests/quality/not_null.sql"),
            "not_null"
        );
    }

    #[test]
    fn gate_fails_only_on_error_severity_fail_or_error() {
        let make = |severity: &str, status: &str| QualityTestResult {
            test_name: "t".to_string(),
            test_file: "t.sql".to_string(),
            severity: severity.to_string(),
            status: status.to_string(),
            row_count: 0,
            message: String::new(),
            duration_ms: 0,
            description: String::new(),
            compiled_sql: String::new(),
            sample_rows: String::new(),
            tags: Vec::new(),
            remediation: String::new(),
        };

        assert!(!has_error_failures(&[make("warn", "fail")]));
        assert!(has_error_failures(&[make("error", "fail")]));
        assert!(has_error_failures(&[make("error", "error")]));
        assert!(!has_error_failures(&[make("error", "pass")]));
    }
}
