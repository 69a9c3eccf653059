//! Bridges `NessieCatalog`'s synchronous `ViewRegistrar` callback to
//! `QueryEngine`'s async DDL. `register_tables` runs inside the refresh
//! loop's own task, so each registration is spawned rather than awaited
//! in place — a slow DDL call for one table must not stall the diff loop
//! from reaching the rest of the discovered set.

use std::sync::Arc;

use rat_catalog::ViewRegistrar;
use rat_engine::QueryEngine;

pub struct EngineRegistrar {
    engine: Arc<QueryEngine>,
}

impl EngineRegistrar {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

impl ViewRegistrar for EngineRegistrar {
    fn register_view(&self, layer: &str, name: &str, s3_path: &str, namespace: &str) {
        let engine = self.engine.clone();
        let layer = layer.to_string();
        let name = name.to_string();
        let s3_path = s3_path.to_string();
        let namespace = namespace.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.register_view(&layer, &name, &s3_path, Some(&namespace)).await {
                tracing::warn!(namespace, layer, name, error = %e, "failed to register view");
            }
        });
    }

    fn drop_view(&self, layer: &str, name: &str, namespace: &str) {
        let engine = self.engine.clone();
        let layer = layer.to_string();
        let name = name.to_string();
        let namespace = namespace.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.drop_view(&layer, &name, Some(&namespace)).await {
                tracing::warn!(namespace, layer, name, error = %e, "failed to drop view");
            }
        });
    }
}
