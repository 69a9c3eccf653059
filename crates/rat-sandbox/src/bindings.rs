//! Assembles the restricted global environment a script pipeline runs in.

use std::sync::Arc;

use mlua::{Lua, LuaOptions, StdLib, Value};
use rat_catalog::NessieClient;
use rat_core::{MergeStrategy, PipelineConfig, PipelineLogger, S3Config};
use rat_engine::PipelineEngine;

use crate::engine_binding::EngineBinding;
use crate::error::SandboxError;

/// Globals stripped even from `StdLib::ALL_SAFE` — `ALL_SAFE` excludes
/// `io`/`os`/`debug`/`ffi`, but `load`/`loadstring`/`dofile`/`loadfile`/
/// `require`/`collectgarbage`/the raw* family/`getmetatable`/
/// `setmetatable` live in the base library and stay unless removed by hand.
const STRIPPED_GLOBALS: &[&str] = &[
    "load",
    "loadstring",
    "dofile",
    "loadfile",
    "require",
    "collectgarbage",
    "rawget",
    "rawset",
    "rawequal",
    "rawlen",
    "getmetatable",
    "setmetatable",
    "_G",
];

/// Build a fresh restricted `Lua` instance — one per script execution, never
/// reused across runs.
pub fn new_restricted_lua() -> mlua::Result<Lua> {
    let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())?;
    let globals = lua.globals();
    for name in STRIPPED_GLOBALS {
        globals.set(*name, Value::Nil)?;
    }
    Ok(lua)
}

fn config_table(lua: &Lua, config: Option<&PipelineConfig>) -> mlua::Result<Value> {
    let Some(config) = config else {
        return Ok(Value::Nil);
    };
    let table = lua.create_table()?;
    table.set("description", config.description.clone())?;
    table.set("materialized", config.materialized.clone())?;
    table.set("unique_key", config.unique_key.clone())?;
    table.set("merge_strategy", config.merge_strategy.to_string())?;
    table.set("watermark_column", config.watermark_column.clone())?;
    table.set("archive_landing_zones", config.archive_landing_zones)?;
    table.set("partition_column", config.partition_column.clone())?;
    table.set("scd_valid_from", config.scd_valid_from.clone())?;
    table.set("scd_valid_to", config.scd_valid_to.clone())?;
    table.set("max_retries", config.max_retries)?;
    table.set("retry_delay_seconds", config.retry_delay_seconds)?;
    Ok(Value::Table(table))
}

fn log_table(lua: &Lua, logger: Option<Arc<dyn PipelineLogger>>) -> mlua::Result<Value> {
    let Some(logger) = logger else {
        return Ok(Value::Nil);
    };
    let table = lua.create_table()?;
    for (name, level): (&str, fn(&dyn PipelineLogger, &str)) in [
        ("info", PipelineLogger::info as fn(&dyn PipelineLogger, &str)),
        ("warn", PipelineLogger::warn),
        ("error", PipelineLogger::error),
        ("debug", PipelineLogger::debug),
    ] {
        let logger = logger.clone();
        let f = lua.create_function(move |_, message: String| {
            level(logger.as_ref(), &message);
            Ok(())
        })?;
        table.set(name, f)?;
    }
    Ok(Value::Table(table))
}

/// Install every binding §4.5 names: `engine`, `ref`, `landing_zone`,
/// `this`, `run_started_at`, `is_incremental`, `config`, `result` (starts
/// `nil`), and an optional `log`.
#[allow(clippy::too_many_arguments)]
pub fn install_bindings(
    lua: &Lua,
    engine: Arc<PipelineEngine>,
    namespace: &str,
    layer: &str,
    pipeline_name: &str,
    s3_config: S3Config,
    nessie_client: Arc<NessieClient>,
    config: Option<&PipelineConfig>,
    run_started_at: &str,
    logger: Option<Arc<dyn PipelineLogger>>,
) -> Result<(), SandboxError> {
    let globals = lua.globals();

    globals.set("engine", EngineBinding::new(engine))?;

    let ns = namespace.to_string();
    let current_namespace = ns.clone();
    let s3_for_ref = s3_config.clone();
    let ref_fn = lua.create_async_function(move |_, table_ref: String| {
        let current_namespace = current_namespace.clone();
        let s3_config = s3_for_ref.clone();
        let nessie_client = nessie_client.clone();
        async move {
            rat_templating::resolve_ref(&table_ref, &current_namespace, &s3_config, &nessie_client)
                .await
                .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
        }
    })?;
    globals.set("ref", ref_fn)?;

    let ns_for_zone = ns.clone();
    let landing_zone_fn = lua.create_function(move |_, zone: String| {
        Ok(rat_templating::resolve_landing_zone(&zone, &ns_for_zone, &s3_config))
    })?;
    globals.set("landing_zone", landing_zone_fn)?;

    globals.set("this", format!("{namespace}.{layer}.{pipeline_name}"))?;
    globals.set("run_started_at", run_started_at.to_string())?;
    globals.set(
        "is_incremental",
        config.map(|c| c.merge_strategy == MergeStrategy::Incremental).unwrap_or(false),
    )?;
    globals.set("config", config_table(lua, config)?)?;
    globals.set("log", log_table(lua, logger)?)?;
    globals.set("result", Value::Nil)?;

    Ok(())
}
