//! Single-table metadata pointer lookup.
//!
//! Separate from `discovery.rs` (which lists and registers every table under
//! a namespace for the query service) because `ref()` resolution only ever
//! needs one table's current metadata file, on a single request path that
//! must fail fast and cheaply so templating can fall back to a directory
//! scan.

use serde::Deserialize;
use std::time::Duration;

use crate::branch::NessieClient;
use crate::error::CatalogError;
use crate::retry::retry_on_transient;

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<ContentBody>,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    #[serde(default, rename = "metadataLocation")]
    metadata_location: String,
}

impl NessieClient {
    /// Load the current Iceberg metadata file location for
    /// `namespace.layer.name` on `branch`. Used by `ref()` resolution to emit
    /// an `iceberg_scan('<exact metadata file>')` expression instead of
    /// guessing a directory path.
    pub async fn load_table_metadata_location(
        &self,
        branch: &str,
        namespace: &str,
        layer: &str,
        name: &str,
    ) -> Result<String, CatalogError> {
        let key = format!("{namespace}.{layer}.{name}");
        retry_on_transient("load_table_metadata_location", || {
            let key = key.clone();
            async move {
                let url = format!(
                    "{}/trees/{branch}/contents/{key}?content=true",
                    self.config().api_v2_url()
                );
                let resp = self
                    .http()
                    .get(&url)
                    .timeout(Duration::from_secs(10))
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    let status = status.as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(CatalogError::Api { status, body });
                }
                let data: ContentResponse = resp.json().await?;
                let location = data
                    .content
                    .map(|c| c.metadata_location)
                    .unwrap_or_default();
                if location.is_empty() {
                    return Err(CatalogError::Api {
                        status: 404,
                        body: format!("no metadata location for {key}"),
                    });
                }
                Ok(location)
            }
        })
        .await
    }
}
