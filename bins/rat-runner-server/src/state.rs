use rat_core::{NessieConfig, S3Config};
use rat_runner::Registry;
use rat_store::StoreClientCache;
use std::sync::Arc;

pub struct AppState {
    pub registry: Arc<Registry>,
    pub s3_config: S3Config,
    pub nessie_config: NessieConfig,
    pub store_cache: StoreClientCache,
}
