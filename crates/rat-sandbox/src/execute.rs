//! Top-level script pipeline execution: validate, build the restricted
//! environment, run, and extract `result`.

use std::sync::Arc;

use datafusion::arrow::array::RecordBatch;
use mlua::Value;
use rat_catalog::NessieClient;
use rat_core::{PipelineConfig, PipelineLogger, S3Config};
use rat_engine::PipelineEngine;

use crate::bindings::{install_bindings, new_restricted_lua};
use crate::error::SandboxError;
use crate::result::QueryResult;
use crate::validate::validate_source;

/// Execute a script pipeline and return its declared result as Arrow
/// record batches.
///
/// Mirrors `execute_python_pipeline`: the script runs with the session and
/// helper bindings from §4.5 injected, and must assign `result` to whatever
/// `engine.sql(...)` returned — assigning anything else, or nothing, is a
/// distinct failure from a script runtime error.
#[allow(clippy::too_many_arguments)]
pub async fn execute_script_pipeline(
    source: &str,
    engine: Arc<PipelineEngine>,
    namespace: &str,
    layer: &str,
    pipeline_name: &str,
    s3_config: S3Config,
    nessie_client: Arc<NessieClient>,
    config: Option<&PipelineConfig>,
    run_started_at: &str,
    logger: Option<Arc<dyn PipelineLogger>>,
) -> Result<Vec<RecordBatch>, SandboxError> {
    validate_source(source)?;

    let lua = new_restricted_lua()?;
    install_bindings(
        &lua,
        engine,
        namespace,
        layer,
        pipeline_name,
        s3_config,
        nessie_client,
        config,
        run_started_at,
        logger,
    )?;

    lua.load(source)
        .set_name(format!("{namespace}.{layer}.{pipeline_name}"))
        .exec_async()
        .await
        .map_err(|e| SandboxError::Syntax(e.to_string()))?;

    let result: Value = lua.globals().get("result")?;
    match result {
        Value::Nil => Err(SandboxError::MissingResult),
        Value::UserData(ud) => {
            let query_result = ud
                .borrow::<QueryResult>()
                .map_err(|_| SandboxError::WrongResultType("userdata".to_string()))?;
            Ok(query_result.batches.clone())
        }
        other => Err(SandboxError::WrongResultType(type_name(&other))),
    }
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Table(_) => "table",
        Value::Function(_) => "function",
        Value::Thread(_) => "thread",
        Value::UserData(_) => "userdata",
        Value::LightUserData(_) => "lightuserdata",
        Value::Error(_) => "error",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_result_is_rejected() {
        let lua = new_restricted_lua().unwrap();
        lua.globals().set("result", Value::Nil).unwrap();
        lua.load("local x = 1").exec_async().await.unwrap();
        let result: Value = lua.globals().get("result").unwrap();
        assert!(matches!(result, Value::Nil));
    }

    #[tokio::test]
    async fn wrong_result_type_is_distinguishable() {
        let lua = new_restricted_lua().unwrap();
        lua.load("result = 42").exec_async().await.unwrap();
        let result: Value = lua.globals().get("result").unwrap();
        assert_eq!(type_name(&result), "integer");
    }

    #[test]
    fn restricted_globals_are_stripped() {
        let lua = new_restricted_lua().unwrap();
        let load_fn: Value = lua.globals().get("load").unwrap();
        assert!(matches!(load_fn, Value::Nil));
        let getmeta: Value = lua.globals().get("getmetatable").unwrap();
        assert!(matches!(getmeta, Value::Nil));
    }
}
