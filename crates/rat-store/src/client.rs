//! TTL-cached S3/MinIO object store clients.
//!
//! Mirrors the boto3 client cache in the original runner: clients are keyed
//! by the full `S3Config` value (hashable, so different STS credentials
//! naturally get distinct cache entries) and expire after 45 minutes to
//! tolerate STS token rotation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use rat_core::S3Config;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::StoreError;

const CLIENT_TTL: Duration = Duration::from_secs(45 * 60);

struct CacheEntry {
    store: Arc<dyn ObjectStore>,
    created_at: Instant,
}

/// TTL-cached map of `S3Config` to object store clients.
pub struct StoreClientCache {
    entries: Mutex<HashMap<S3Config, CacheEntry>>,
}

impl Default for StoreClientCache {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl StoreClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a cached client for `config`, building (and caching) a fresh
    /// one if absent or past its TTL.
    pub async fn get(&self, config: &S3Config) -> Result<Arc<dyn ObjectStore>, StoreError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(config) {
            if entry.created_at.elapsed() < CLIENT_TTL {
                return Ok(entry.store.clone());
            }
        }

        info!(bucket = %config.bucket, endpoint = %config.endpoint, "building object store client");
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
            .map_err(|e| StoreError::ClientBuild(e.to_string()))?;
        let store: Arc<dyn ObjectStore> = Arc::new(store);

        entries.insert(
            config.clone(),
            CacheEntry {
                store: store.clone(),
                created_at: Instant::now(),
            },
        );
        Ok(store)
    }

    /// Drop all cached clients, forcing the next `get` to rebuild.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> S3Config {
        S3Config {
            endpoint: "localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "rat".to_string(),
            use_ssl: false,
            session_token: String::new(),
            region: "us-east-1".to_string(),
        }
    }

    #[tokio::test]
    async fn caches_client_for_same_config() {
        let cache = StoreClientCache::new();
        let a = cache.get(&test_config()).await.unwrap();
        let b = cache.get(&test_config()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn distinct_configs_get_distinct_clients() {
        let cache = StoreClientCache::new();
        let a = cache.get(&test_config()).await.unwrap();
        let mut other = test_config();
        other.session_token = "different-token".to_string();
        let b = cache.get(&other).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
