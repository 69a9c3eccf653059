//! `ValidatePipeline`: compile a pipeline's template and check it for
//! dependency cycles against every other known pipeline in the namespace,
//! without executing anything. See `SPEC_FULL.md`'s supplemented
//! "ValidatePipeline RPC" feature — implied by `templating::validate_template`
//! plus `dag::validate_dag` in the original, not itemized as its own RPC.

use std::sync::Arc;

use object_store::ObjectStore;
use rat_dag::{validate_dag, PipelineSource};
use rat_rpc::{RpcError, ValidatePipelineRequest, ValidatePipelineResponse};
use rat_templating::validate_template;

use crate::state::AppState;

async fn read_pipeline_source(
    store: &dyn ObjectStore,
    namespace: &str,
    layer: &str,
    name: &str,
) -> Result<Option<String>, rat_store::StoreError> {
    let prefix = format!("{namespace}/pipelines/{layer}/{name}");
    if let Some(src) = rat_store::read_text(store, &format!("{prefix}/pipeline.lua")).await? {
        return Ok(Some(src));
    }
    rat_store::read_text(store, &format!("{prefix}/pipeline.sql")).await
}

/// `<ns>/pipelines/<layer>/<name>/pipeline.{sql|lua}` -> `(layer, name)`.
fn parse_pipeline_key(key: &str, namespace: &str) -> Option<(String, String)> {
    let rest = key.strip_prefix(&format!("{namespace}/pipelines/"))?;
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    if parts[2] != "pipeline.sql" && parts[2] != "pipeline.lua" {
        return None;
    }
    Some((parts[0].to_string(), parts[1].to_string()))
}

pub async fn validate_pipeline(
    state: &Arc<AppState>,
    req: ValidatePipelineRequest,
) -> Result<ValidatePipelineResponse, RpcError> {
    let store = state
        .store_cache
        .get(&state.s3_config)
        .await
        .map_err(|e| RpcError::Internal(e.to_string()))?;

    let layer = req.layer.to_string();
    let source = match req.code.clone() {
        Some(code) => code,
        None => read_pipeline_source(store.as_ref(), &req.namespace, &layer, &req.pipeline_name)
            .await
            .map_err(|e| RpcError::Internal(e.to_string()))?
            .ok_or_else(|| {
                RpcError::NotFound(format!(
                    "no pipeline.sql or pipeline.lua found for {}/{}/{}",
                    req.namespace, layer, req.pipeline_name
                ))
            })?,
    };

    let (mut errors, warnings) = validate_template(&source);

    let prefix = format!("{}/pipelines/", req.namespace);
    let all_keys = rat_store::list_keys(store.as_ref(), &prefix, None)
        .await
        .map_err(|e| RpcError::Internal(e.to_string()))?;

    let mut pipelines = Vec::new();
    for key in all_keys {
        let Some((p_layer, p_name)) = parse_pipeline_key(&key, &req.namespace) else { continue };
        if p_layer == layer && p_name == req.pipeline_name {
            continue; // replaced below with the (possibly unsaved) source under validation
        }
        if let Ok(Some(sql)) = rat_store::read_text(store.as_ref(), &key).await {
            pipelines.push(PipelineSource { namespace: req.namespace.clone(), layer: p_layer, name: p_name, sql });
        }
    }
    pipelines.push(PipelineSource {
        namespace: req.namespace.clone(),
        layer: layer.clone(),
        name: req.pipeline_name.clone(),
        sql: source,
    });

    errors.extend(validate_dag(&pipelines, &req.namespace));

    Ok(ValidatePipelineResponse { valid: errors.is_empty(), errors, warnings })
}
