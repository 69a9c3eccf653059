//! Parsing and merging of pipeline `config.yaml` with source-level
//! annotation metadata (`-- @key: value` / `# @key: value`).
//!
//! Annotation metadata always wins over `config.yaml` on a per-field basis,
//! except `partition_by`, which is only ever read from `config.yaml` — a
//! partition spec is a table-creation-time decision that doesn't make sense
//! to override per-run from source comments.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::{MergeStrategy, PartitionByEntry, PipelineConfig, VALID_PARTITION_TRANSFORMS};

/// Raw shape of `config.yaml`, deserialized before being reconciled into a
/// `PipelineConfig`. All fields are optional so a minimal config.yaml (or
/// none at all) is valid.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPipelineConfig {
    description: Option<String>,
    materialized: Option<String>,
    unique_key: Option<UniqueKey>,
    merge_strategy: Option<String>,
    watermark_column: Option<String>,
    archive_landing_zones: Option<bool>,
    partition_column: Option<String>,
    partition_by: Option<Vec<RawPartitionEntry>>,
    scd_valid_from: Option<String>,
    scd_valid_to: Option<String>,
    max_retries: Option<u32>,
    retry_delay_seconds: Option<u64>,
}

/// `unique_key` may be written as a single string or a list in YAML.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UniqueKey {
    Single(String),
    Many(Vec<String>),
}

impl UniqueKey {
    fn into_vec(self) -> Vec<String> {
        match self {
            UniqueKey::Single(s) => vec![s],
            UniqueKey::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPartitionEntry {
    ColumnOnly(String),
    Full { column: String, transform: String },
}

fn parse_partition_by(entries: Vec<RawPartitionEntry>) -> Result<Vec<PartitionByEntry>, ConfigError> {
    entries
        .into_iter()
        .map(|e| match e {
            RawPartitionEntry::ColumnOnly(column) => Ok(PartitionByEntry {
                column,
                transform: "identity".to_string(),
            }),
            RawPartitionEntry::Full { column, transform } => {
                if !VALID_PARTITION_TRANSFORMS.contains(&transform.as_str()) {
                    return Err(ConfigError::UnsupportedTransform(transform, column));
                }
                Ok(PartitionByEntry { column, transform })
            }
        })
        .collect()
}

/// Parse a `config.yaml` document into a `PipelineConfig`.
pub fn parse_pipeline_config(yaml: &str) -> Result<PipelineConfig, ConfigError> {
    let raw: RawPipelineConfig = serde_yaml::from_str(yaml)?;
    raw_to_config(raw)
}

fn raw_to_config(raw: RawPipelineConfig) -> Result<PipelineConfig, ConfigError> {
    let defaults = PipelineConfig::default();
    let merge_strategy = match raw.merge_strategy {
        Some(s) => s.parse()?,
        None => defaults.merge_strategy,
    };
    let partition_by = match raw.partition_by {
        Some(entries) => parse_partition_by(entries)?,
        None => Vec::new(),
    };
    Ok(PipelineConfig {
        description: raw.description.unwrap_or(defaults.description),
        materialized: raw.materialized.unwrap_or(defaults.materialized),
        unique_key: raw.unique_key.map(UniqueKey::into_vec).unwrap_or_default(),
        merge_strategy,
        watermark_column: raw.watermark_column.unwrap_or(defaults.watermark_column),
        archive_landing_zones: raw.archive_landing_zones.unwrap_or(defaults.archive_landing_zones),
        partition_column: raw.partition_column.unwrap_or(defaults.partition_column),
        partition_by,
        scd_valid_from: raw.scd_valid_from.unwrap_or(defaults.scd_valid_from),
        scd_valid_to: raw.scd_valid_to.unwrap_or(defaults.scd_valid_to),
        max_retries: raw.max_retries.unwrap_or(defaults.max_retries),
        retry_delay_seconds: raw.retry_delay_seconds.unwrap_or(defaults.retry_delay_seconds),
    })
}

/// Build a `PipelineConfig` purely from source-level `@key: value`
/// annotations (used when no `config.yaml` exists alongside the source).
pub fn metadata_to_config(metadata: &BTreeMap<String, String>) -> PipelineConfig {
    let defaults = PipelineConfig::default();
    let mut cfg = defaults.clone();
    apply_annotations(&mut cfg, metadata);
    cfg
}

/// Merge `config.yaml`-derived config with source-level annotations.
/// Annotations win per-field, except `partition_by` which is config.yaml-only.
pub fn merge_configs(base: PipelineConfig, metadata: &BTreeMap<String, String>) -> PipelineConfig {
    let mut merged = base;
    apply_annotations(&mut merged, metadata);
    merged
}

fn apply_annotations(cfg: &mut PipelineConfig, metadata: &BTreeMap<String, String>) {
    if let Some(v) = metadata.get("description") {
        cfg.description = v.clone();
    }
    if let Some(v) = metadata.get("materialized") {
        cfg.materialized = v.clone();
    }
    if let Some(v) = metadata.get("unique_key") {
        cfg.unique_key = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    }
    if let Some(v) = metadata.get("merge_strategy") {
        if let Ok(strategy) = v.parse::<MergeStrategy>() {
            cfg.merge_strategy = strategy;
        }
    }
    if let Some(v) = metadata.get("watermark_column") {
        cfg.watermark_column = v.clone();
    }
    if let Some(v) = metadata.get("archive_landing_zones") {
        cfg.archive_landing_zones = v.eq_ignore_ascii_case("true");
    }
    if let Some(v) = metadata.get("partition_column") {
        cfg.partition_column = v.clone();
    }
    if let Some(v) = metadata.get("scd_valid_from") {
        cfg.scd_valid_from = v.clone();
    }
    if let Some(v) = metadata.get("scd_valid_to") {
        cfg.scd_valid_to = v.clone();
    }
    if let Some(v) = metadata.get("max_retries") {
        if let Ok(n) = v.parse() {
            cfg.max_retries = n;
        }
    }
    if let Some(v) = metadata.get("retry_delay_seconds") {
        if let Ok(n) = v.parse() {
            cfg.retry_delay_seconds = n;
        }
    }
    // partition_by is intentionally never overridden from annotations.
}

/// Validate semantic requirements a merge strategy places on the rest of
/// the config (defense-in-depth; Phase 3 also downgrades at write time).
pub fn validate_pipeline_config(cfg: &PipelineConfig) -> Result<(), String> {
    match cfg.merge_strategy {
        MergeStrategy::Incremental | MergeStrategy::DeleteInsert | MergeStrategy::Scd2 => {
            if cfg.unique_key.is_empty() {
                return Err(format!(
                    "merge_strategy {} requires a non-empty unique_key",
                    cfg.merge_strategy
                ));
            }
        }
        MergeStrategy::Snapshot => {
            if cfg.partition_column.is_empty() {
                return Err("merge_strategy snapshot requires partition_column".to_string());
            }
        }
        MergeStrategy::FullRefresh | MergeStrategy::AppendOnly => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml_with_all_defaults() {
        let cfg = parse_pipeline_config("description: orders table\n").unwrap();
        assert_eq!(cfg.description, "orders table");
        assert_eq!(cfg.merge_strategy, MergeStrategy::FullRefresh);
        assert_eq!(cfg.scd_valid_from, "valid_from");
    }

    #[test]
    fn unique_key_accepts_single_string_or_list() {
        let single = parse_pipeline_config("unique_key: id\n").unwrap();
        assert_eq!(single.unique_key, vec!["id".to_string()]);

        let many = parse_pipeline_config("unique_key:\n  - id\n  - region\n").unwrap();
        assert_eq!(many.unique_key, vec!["id".to_string(), "region".to_string()]);
    }

    #[test]
    fn partition_by_rejects_unsupported_transform() {
        let yaml = "partition_by:\n  - column: created_at\n    transform: century\n";
        let err = parse_pipeline_config(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedTransform(_, _)));
    }

    #[test]
    fn annotations_override_yaml_fields_except_partition_by() {
        let base = parse_pipeline_config(
            "merge_strategy: full_refresh\npartition_by:\n  - column: created_at\n    transform: day\n",
        )
        .unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert("merge_strategy".to_string(), "incremental".to_string());
        let merged = merge_configs(base, &metadata);
        assert_eq!(merged.merge_strategy, MergeStrategy::Incremental);
        assert_eq!(merged.partition_by.len(), 1);
    }

    #[test]
    fn validate_requires_unique_key_for_incremental() {
        let cfg = PipelineConfig {
            merge_strategy: MergeStrategy::Incremental,
            ..PipelineConfig::default()
        };
        assert!(validate_pipeline_config(&cfg).is_err());
    }
}
