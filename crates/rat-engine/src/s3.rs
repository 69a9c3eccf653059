//! Shared S3 object-store registration for DataFusion session contexts.
//!
//! Kept identical between the per-run pipeline engine and the long-lived
//! query engine — both need the same bucket reachable under the same `s3://`
//! scheme, and historically the two copies of this setup code have drifted.

use std::sync::Arc;

use datafusion::execution::context::SessionContext;
use object_store::aws::AmazonS3Builder;
use rat_core::S3Config;
use url::Url;

use crate::error::EngineError;

/// Build the S3-compatible object store for `config` and register it on
/// `ctx` under the `s3://<bucket>` scheme.
pub fn register_object_store(ctx: &SessionContext, config: &S3Config) -> Result<(), EngineError> {
    let mut builder = AmazonS3Builder::new()
        .with_endpoint(config.endpoint_url())
        .with_access_key_id(&config.access_key)
        .with_secret_access_key(&config.secret_key)
        .with_region(&config.region)
        .with_bucket_name(&config.bucket)
        .with_allow_http(!config.use_ssl);
    if !config.session_token.is_empty() {
        builder = builder.with_token(&config.session_token);
    }
    let store = builder
        .build()
        .map_err(|e| EngineError::ObjectStore(e.to_string()))?;

    let url = Url::parse(&format!("s3://{}", config.bucket))
        .map_err(|e| EngineError::ObjectStore(e.to_string()))?;
    ctx.runtime_env().register_object_store(&url, Arc::new(store));
    Ok(())
}
