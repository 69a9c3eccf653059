//! The `engine` global injected into script pipelines: a narrow, read-mostly
//! view over the run's `PipelineEngine`. Mirrors `_SafeDuckDBConnection` —
//! only `sql` is reachable; every other key (including anything
//! underscore-prefixed) is refused rather than proxied through to the real
//! engine.

use std::sync::{Arc, OnceLock};

use mlua::{MetaMethod, UserData, UserDataMethods};
use rat_engine::PipelineEngine;
use regex::Regex;

use crate::result::QueryResult;

fn dangerous_sql_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(COPY|ATTACH|INSTALL|LOAD|CREATE\s+MACRO|IMPORT|EXPORT)\b").unwrap()
    })
}

pub struct EngineBinding {
    engine: Arc<PipelineEngine>,
}

impl EngineBinding {
    pub fn new(engine: Arc<PipelineEngine>) -> Self {
        Self { engine }
    }
}

async fn run_sql(engine: Arc<PipelineEngine>, query: String) -> mlua::Result<QueryResult> {
    if let Some(m) = dangerous_sql_re().find(&query) {
        let snippet: String = query.chars().take(100).collect();
        return Err(mlua::Error::RuntimeError(format!(
            "SQL command '{}' not allowed in pipeline scripts. Blocked pattern found in: {snippet}...",
            m.as_str()
        )));
    }
    let batches = engine
        .query_arrow(&query)
        .await
        .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
    Ok(QueryResult { batches })
}

impl UserData for EngineBinding {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        // A hand-rolled `__index` rather than `add_method("sql", ...)` so
        // that `engine["sql"]`, `engine._conn`, and every other access path
        // goes through the same single gate — the same intent as the
        // Python wrapper's `__getattribute__` override.
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            if key != "sql" {
                return Err(mlua::Error::RuntimeError(format!(
                    "access to 'engine.{key}' is not allowed in pipeline scripts"
                )));
            }
            let engine = this.engine.clone();
            let f = lua.create_async_function(move |_, query: String| {
                let engine = engine.clone();
                async move { run_sql(engine, query).await }
            })?;
            Ok(f)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangerous_sql_pattern_matches_copy_and_attach() {
        assert!(dangerous_sql_re().is_match("COPY (SELECT 1) TO 'out.csv'"));
        assert!(dangerous_sql_re().is_match("ATTACH 'x.db'"));
        assert!(dangerous_sql_re().is_match("CREATE MACRO foo() AS 1"));
        assert!(!dangerous_sql_re().is_match("SELECT * FROM bronze.orders"));
    }
}
