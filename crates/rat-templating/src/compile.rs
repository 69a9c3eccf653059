//! Top-level template compilation: resolve every reference once up front,
//! then render.

use std::collections::HashMap;

use rat_catalog::NessieClient;
use rat_core::{MergeStrategy, PipelineConfig, S3Config};

use crate::annotations::strip_metadata_lines;
use crate::dependencies::{extract_dependencies, extract_landing_zones};
use crate::error::TemplatingError;
use crate::render::{parse_template, render_nodes, RenderCtx};
use crate::resolve::{resolve_landing_zone, resolve_ref};

/// Compile a pipeline SQL template with `ref()` resolution.
///
/// Available in templates: `ref('layer.name')`/`ref('ns.layer.name')`,
/// `landing_zone('zone')`, `this` (the current pipeline's target table,
/// resolved the same way as `ref()`), `run_started_at`, `is_incremental()` /
/// `is_scd2()` / `is_snapshot()` / `is_append_only()` / `is_delete_insert()`,
/// and `watermark_value`.
///
/// `landing_zone_overrides` lets a caller (preview) substitute a
/// pre-resolved expression — e.g. a `_samples/` subfolder — for a zone
/// instead of the default recursive glob.
#[allow(clippy::too_many_arguments)]
pub async fn compile_sql(
    raw_sql: &str,
    namespace: &str,
    layer: &str,
    pipeline_name: &str,
    s3_config: &S3Config,
    nessie_client: &NessieClient,
    config: Option<&PipelineConfig>,
    watermark_value: Option<&str>,
    landing_zone_overrides: Option<&HashMap<String, String>>,
) -> Result<String, TemplatingError> {
    let run_started_at = chrono::Utc::now().to_rfc3339();

    let this_ref = format!("{layer}.{pipeline_name}");
    let mut ref_map = HashMap::new();
    let mut refs = extract_dependencies(raw_sql);
    refs.push(this_ref.clone());
    for table_ref in refs {
        if ref_map.contains_key(&table_ref) {
            continue;
        }
        let resolved = resolve_ref(&table_ref, namespace, s3_config, nessie_client).await?;
        ref_map.insert(table_ref, resolved);
    }
    let this = ref_map.get(&this_ref).cloned().unwrap_or_default();

    let mut landing_zone_map = HashMap::new();
    for zone in extract_landing_zones(raw_sql) {
        if landing_zone_map.contains_key(&zone) {
            continue;
        }
        let resolved = match landing_zone_overrides.and_then(|overrides| overrides.get(&zone)) {
            Some(v) => v.clone(),
            None => resolve_landing_zone(&zone, namespace, s3_config),
        };
        landing_zone_map.insert(zone, resolved);
    }

    let strategy = config.map(|c| c.merge_strategy);
    let ctx = RenderCtx {
        this,
        run_started_at,
        watermark_value: watermark_value.map(|s| s.to_string()),
        is_incremental: strategy == Some(MergeStrategy::Incremental),
        is_scd2: strategy == Some(MergeStrategy::Scd2),
        is_snapshot: strategy == Some(MergeStrategy::Snapshot),
        is_append_only: strategy == Some(MergeStrategy::AppendOnly),
        is_delete_insert: strategy == Some(MergeStrategy::DeleteInsert),
        ref_map,
        landing_zone_map,
    };

    let nodes = parse_template(raw_sql)?;
    let rendered = render_nodes(&nodes, &ctx)?;
    Ok(strip_metadata_lines(&rendered))
}
