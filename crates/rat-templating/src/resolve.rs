//! `ref()` / `landing_zone()` resolution to catalog-scan expressions.

use rat_catalog::NessieClient;
use rat_core::{escape_sql_string, S3Config};

use crate::error::TemplatingError;

/// Split a `ref()` argument into `(namespace, layer, name)`.
///
/// Accepts `"layer.name"` (implicit current namespace) or
/// `"ns.layer.name"`.
pub fn split_ref(table_ref: &str, current_namespace: &str) -> Result<(String, String, String), TemplatingError> {
    let parts: Vec<&str> = table_ref.splitn(3, '.').collect();
    match parts.as_slice() {
        [layer, name] => Ok((current_namespace.to_string(), layer.to_string(), name.to_string())),
        [ns, layer, name] => Ok((ns.to_string(), layer.to_string(), name.to_string())),
        _ => Err(TemplatingError::InvalidRef(table_ref.to_string())),
    }
}

/// Resolve a `ref('...')` to an `iceberg_scan()` expression.
///
/// Prefers the exact metadata file location from the catalog, on `main` —
/// upstream tables a pipeline depends on are expected to already be merged.
/// Falls back to a directory-scan expression with `allow_moved_paths` set
/// when the catalog is unreachable or the table hasn't been created yet.
pub async fn resolve_ref(
    table_ref: &str,
    current_namespace: &str,
    s3_config: &S3Config,
    nessie_client: &NessieClient,
) -> Result<String, TemplatingError> {
    let (ref_ns, ref_layer, ref_name) = split_ref(table_ref, current_namespace)?;

    match nessie_client
        .load_table_metadata_location("main", &ref_ns, &ref_layer, &ref_name)
        .await
    {
        Ok(metadata_location) => {
            let safe_location = escape_sql_string(&metadata_location);
            Ok(format!("iceberg_scan('{safe_location}')"))
        }
        Err(e) => {
            tracing::warn!(
                table_ref,
                error = %e,
                "failed to resolve ref via catalog, using fallback"
            );
            let table_path = format!("s3://{}/{ref_ns}/{ref_layer}/{ref_name}/", s3_config.bucket);
            let safe_path = escape_sql_string(&table_path);
            Ok(format!("iceberg_scan('{safe_path}', allow_moved_paths = true)"))
        }
    }
}

/// Resolve `landing_zone('name')` to a recursive glob over raw files.
///
/// A bare directory path (no glob) is treated by most Arrow readers as a
/// single-file read and 404s, so `/**` is required.
pub fn resolve_landing_zone(zone_name: &str, namespace: &str, s3_config: &S3Config) -> String {
    format!("s3://{}/{namespace}/landing/{zone_name}/**", s3_config.bucket)
}

/// Resolve `landing_zone('name')` for preview — prefers a `_samples/`
/// subfolder if one has files, falling back to the full zone and recording
/// a warning.
pub async fn resolve_landing_zone_preview(
    zone_name: &str,
    namespace: &str,
    s3_config: &S3Config,
    store: &dyn object_store::ObjectStore,
    warnings: &mut Vec<String>,
) -> String {
    let samples_prefix = format!("{namespace}/landing/{zone_name}/_samples/");
    match rat_store::list_keys(store, &samples_prefix, None).await {
        Ok(keys) if !keys.is_empty() => {
            format!("s3://{}/{namespace}/landing/{zone_name}/_samples/**", s3_config.bucket)
        }
        _ => {
            warnings.push(format!(
                "No sample files for landing zone '{zone_name}' (looked in _samples/). Using all files."
            ));
            format!("s3://{}/{namespace}/landing/{zone_name}/**", s3_config.bucket)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_two_part_ref_with_current_namespace() {
        let (ns, layer, name) = split_ref("silver.orders", "analytics").unwrap();
        assert_eq!((ns.as_str(), layer.as_str(), name.as_str()), ("analytics", "silver", "orders"));
    }

    #[test]
    fn splits_three_part_ref() {
        let (ns, layer, name) = split_ref("other_ns.bronze.events", "analytics").unwrap();
        assert_eq!((ns.as_str(), layer.as_str(), name.as_str()), ("other_ns", "bronze", "events"));
    }

    #[test]
    fn rejects_single_part_ref() {
        assert!(split_ref("orders", "analytics").is_err());
    }

    #[test]
    fn landing_zone_resolves_to_recursive_glob() {
        let s3 = S3Config { bucket: "rat".to_string(), ..S3Config::default() };
        assert_eq!(
            resolve_landing_zone("orders_csv", "analytics", &s3),
            "s3://rat/analytics/landing/orders_csv/**"
        );
    }
}
