use std::sync::Arc;

use rat_catalog::NessieCatalog;
use rat_core::QueryConfig;
use rat_engine::QueryEngine;

use crate::registrar::EngineRegistrar;

pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub catalog: Arc<NessieCatalog<EngineRegistrar>>,
    pub config: QueryConfig,
}
