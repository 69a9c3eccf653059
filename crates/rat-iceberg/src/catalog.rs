//! Catalog construction and hierarchical namespace creation.
//!
//! The runner talks to Nessie through two different faces: `rat_catalog`'s
//! `NessieClient` owns branch lifecycle (create/merge/delete ephemeral run
//! branches), while this module builds an `iceberg` crate `RestCatalog`
//! scoped to one branch for table reads/writes. Both point at the same
//! Nessie server; the REST catalog's `prefix` is the branch name, which is
//! how Nessie's Iceberg REST adapter namespaces table state per reference.

use std::collections::HashMap;

use iceberg::{Catalog, NamespaceIdent};
use iceberg_catalog_rest::{RestCatalog, RestCatalogConfig};

use rat_core::{NessieConfig, S3Config};

use crate::error::IcebergError;

/// Build a catalog handle scoped to `branch`. Every table load/create/commit
/// against the returned catalog resolves and lands against that branch.
pub fn get_catalog(s3_config: &S3Config, nessie_config: &NessieConfig, branch: &str) -> RestCatalog {
    let mut props = HashMap::new();
    props.insert("s3.endpoint".to_string(), s3_config.endpoint_url());
    props.insert("s3.access-key-id".to_string(), s3_config.access_key.clone());
    props.insert("s3.secret-access-key".to_string(), s3_config.secret_key.clone());
    props.insert("s3.path-style-access".to_string(), "true".to_string());
    props.insert("s3.region".to_string(), s3_config.region.clone());
    if !s3_config.session_token.is_empty() {
        props.insert("s3.session-token".to_string(), s3_config.session_token.clone());
    }

    let config = RestCatalogConfig::builder()
        .uri(nessie_config.base_url())
        .warehouse(format!("s3://{}", s3_config.bucket))
        .prefix(branch.to_string())
        .props(props)
        .build();
    RestCatalog::new(config)
}

/// Create every level of a dotted namespace (`"silver"`, then
/// `"silver.orders"` does not apply here — namespaces in this catalog are
/// single-level layer names like `silver`/`gold`, but multi-part logical
/// namespaces such as `{tenant}.silver` are created level by level so a
/// missing parent never surfaces as an opaque create failure).
pub async fn ensure_namespace(catalog: &RestCatalog, namespace: &str) -> Result<(), IcebergError> {
    let parts: Vec<String> = namespace.split('.').map(str::to_string).collect();
    for i in 1..=parts.len() {
        let ident = NamespaceIdent::from_vec(parts[..i].to_vec())
            .map_err(|e| IcebergError::Catalog(e.to_string()))?;
        let exists = catalog
            .namespace_exists(&ident)
            .await
            .map_err(|e| IcebergError::Catalog(e.to_string()))?;
        if exists {
            continue;
        }
        catalog
            .create_namespace(&ident, HashMap::new())
            .await
            .map_err(|e| IcebergError::Catalog(e.to_string()))?;
    }
    Ok(())
}

/// Split `"namespace.layer.name"` into its namespace and table-name parts.
pub fn split_table_ident(table_name: &str) -> Result<(String, String), IcebergError> {
    match table_name.rsplit_once('.') {
        Some((namespace, name)) => Ok((namespace.to_string(), name.to_string())),
        None => Err(IcebergError::Catalog(format!(
            "table name {table_name:?} must be namespace-qualified"
        ))),
    }
}

pub fn table_ident(table_name: &str) -> Result<iceberg::TableIdent, IcebergError> {
    let (namespace, name) = split_table_ident(table_name)?;
    let ns_parts: Vec<String> = namespace.split('.').map(str::to_string).collect();
    let ns = NamespaceIdent::from_vec(ns_parts).map_err(|e| IcebergError::Catalog(e.to_string()))?;
    Ok(iceberg::TableIdent::new(ns, name))
}
