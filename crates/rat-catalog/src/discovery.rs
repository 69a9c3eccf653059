//! Table discovery against the Nessie `main` branch, used by the query
//! service to keep its registered views in sync with what the runner has
//! committed.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use rat_core::NessieConfig;
use serde::Deserialize;

use crate::error::CatalogError;

const VALID_LAYERS: [&str; 3] = ["bronze", "silver", "gold"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub namespace: String,
    pub layer: String,
    pub name: String,
    pub s3_base_path: String,
}

#[derive(Debug, Deserialize)]
struct EntriesResponse {
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(rename = "type")]
    entry_type: String,
    name: EntryName,
    #[serde(default)]
    content: Option<EntryContent>,
}

#[derive(Debug, Deserialize)]
struct EntryName {
    #[serde(default)]
    elements: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EntryContent {
    #[serde(default, rename = "metadataLocation")]
    metadata_location: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    hash: String,
}

/// Registers/drops views as tables appear, change snapshot, or disappear
/// from the catalog. Registration itself (`register_view`/`drop_view`) lives
/// behind the `ViewRegistrar` trait so this module stays engine-agnostic.
pub trait ViewRegistrar: Send + Sync {
    fn register_view(&self, layer: &str, name: &str, s3_path: &str, namespace: &str);
    fn drop_view(&self, layer: &str, name: &str, namespace: &str);
}

struct CatalogState {
    tables: Vec<TableEntry>,
    last_commit_hash: String,
    table_paths: HashMap<(String, String), String>,
}

pub struct NessieCatalog<R: ViewRegistrar> {
    config: NessieConfig,
    bucket: String,
    http: reqwest::Client,
    registrar: R,
    state: Mutex<CatalogState>,
}

impl<R: ViewRegistrar> NessieCatalog<R> {
    pub fn new(config: NessieConfig, bucket: String, registrar: R) -> Self {
        Self {
            config,
            bucket,
            http: reqwest::Client::new(),
            registrar,
            state: Mutex::new(CatalogState {
                tables: Vec::new(),
                last_commit_hash: String::new(),
                table_paths: HashMap::new(),
            }),
        }
    }

    async fn commit_hash(&self) -> String {
        let url = format!("{}/trees/main", self.config.api_v2_url());
        match self
            .http
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp
                .json::<TreeResponse>()
                .await
                .map(|t| t.hash)
                .unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    pub async fn discover_tables(&self, namespace: &str) -> Result<Vec<TableEntry>, CatalogError> {
        let url = format!("{}/trees/main/entries?content=true", self.config.api_v2_url());
        let resp = self
            .http
            .get(&url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CatalogError::Api { status, body });
        }
        let data: EntriesResponse = resp.json().await?;

        let mut out = Vec::new();
        for entry in data.entries {
            if entry.entry_type != "ICEBERG_TABLE" {
                continue;
            }
            if entry.name.elements.len() < 3 {
                continue;
            }
            let ns = &entry.name.elements[0];
            let layer = &entry.name.elements[1];
            let table_name = &entry.name.elements[2];
            if ns != namespace || !VALID_LAYERS.contains(&layer.as_str()) {
                continue;
            }
            let meta_loc = entry.content.map(|c| c.metadata_location).unwrap_or_default();
            let s3_base_path = meta_loc
                .find("/metadata/")
                .map(|idx| meta_loc[..idx].to_string())
                .unwrap_or_default();

            out.push(TableEntry {
                namespace: ns.clone(),
                layer: layer.clone(),
                name: table_name.clone(),
                s3_base_path,
            });
        }
        Ok(out)
    }

    /// Discover tables and register/drop views as needed. Skips entirely
    /// when the Nessie main branch commit hash is unchanged, and within a
    /// refresh only re-registers tables whose table-root path changed.
    pub async fn register_tables(&self, namespace: &str) -> Result<(), CatalogError> {
        let current_hash = self.commit_hash().await;
        {
            let state = self.state.lock().unwrap();
            if !current_hash.is_empty() && current_hash == state.last_commit_hash {
                tracing::debug!(hash = %current_hash, "Nessie commit hash unchanged, skipping refresh");
                return Ok(());
            }
        }

        let tables = self.discover_tables(namespace).await?;
        let new_keys: HashSet<(String, String)> =
            tables.iter().map(|t| (t.layer.clone(), t.name.clone())).collect();

        let old_keys: HashSet<(String, String)> = {
            let state = self.state.lock().unwrap();
            state.tables.iter().map(|t| (t.layer.clone(), t.name.clone())).collect()
        };

        let mut new_paths = HashMap::new();
        let mut registered = 0u32;
        let mut skipped = 0u32;
        for t in &tables {
            let s3_path = if t.s3_base_path.is_empty() {
                format!("s3://{}/{}/{}/{}", self.bucket, t.namespace, t.layer, t.name)
            } else {
                t.s3_base_path.clone()
            };
            let key = (t.layer.clone(), t.name.clone());

            let unchanged = {
                let state = self.state.lock().unwrap();
                state.table_paths.get(&key) == Some(&s3_path)
            };
            if unchanged {
                skipped += 1;
            } else {
                self.registrar.register_view(&t.layer, &t.name, &s3_path, namespace);
                registered += 1;
            }
            new_paths.insert(key, s3_path);
        }

        for (layer, name) in old_keys.difference(&new_keys) {
            self.registrar.drop_view(layer, name, namespace);
        }

        {
            let mut state = self.state.lock().unwrap();
            state.tables = tables;
            state.table_paths = new_paths;
            if !current_hash.is_empty() {
                state.last_commit_hash = current_hash;
            }
        }

        if skipped > 0 {
            tracing::info!(registered, skipped, namespace, "registered tables (some unchanged)");
        } else {
            tracing::info!(registered, namespace, "registered tables");
        }
        Ok(())
    }

    pub fn get_tables(&self, namespace: &str, layer_filter: Option<&str>) -> Vec<TableEntry> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .iter()
            .filter(|t| t.namespace == namespace)
            .filter(|t| layer_filter.map(|l| t.layer == l).unwrap_or(true))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingRegistrar {
        registrations: AtomicU32,
        drops: AtomicU32,
    }

    impl ViewRegistrar for RecordingRegistrar {
        fn register_view(&self, _layer: &str, _name: &str, _s3_path: &str, _namespace: &str) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
        }
        fn drop_view(&self, _layer: &str, _name: &str, _namespace: &str) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn get_tables_filters_by_namespace_and_layer() {
        let registrar = RecordingRegistrar {
            registrations: AtomicU32::new(0),
            drops: AtomicU32::new(0),
        };
        let catalog = NessieCatalog::new(NessieConfig::default(), "rat".to_string(), registrar);
        {
            let mut state = catalog.state.lock().unwrap();
            state.tables = vec![
                TableEntry {
                    namespace: "analytics".to_string(),
                    layer: "bronze".to_string(),
                    name: "orders".to_string(),
                    s3_base_path: "s3://rat/analytics/bronze/orders".to_string(),
                },
                TableEntry {
                    namespace: "analytics".to_string(),
                    layer: "gold".to_string(),
                    name: "orders_summary".to_string(),
                    s3_base_path: "s3://rat/analytics/gold/orders_summary".to_string(),
                },
            ];
        }
        let bronze_only = catalog.get_tables("analytics", Some("bronze"));
        assert_eq!(bronze_only.len(), 1);
        assert_eq!(bronze_only[0].name, "orders");
    }
}
