//! Partition spec construction from a pipeline's `partition_by` config and
//! the Arrow schema of the data being written.
//!
//! Field ids for partition fields start at 1000 and climb by one per entry,
//! well clear of the data-column field ids (which mirror Arrow schema
//! position). Source ids are 1-based Arrow column positions, matching
//! Iceberg's own 1-based field numbering.

use datafusion::arrow::datatypes::Schema as ArrowSchema;

use rat_core::{PartitionByEntry, VALID_PARTITION_TRANSFORMS};

use crate::error::IcebergError;

const FIRST_PARTITION_FIELD_ID: i32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFieldSpec {
    pub source_id: i32,
    pub field_id: i32,
    pub name: String,
    pub transform: String,
}

/// Build the ordered list of partition fields for `partition_by` against
/// `schema`. Empty `partition_by` yields an empty (unpartitioned) spec.
pub fn build_partition_spec(
    schema: &ArrowSchema,
    partition_by: &[PartitionByEntry],
) -> Result<Vec<PartitionFieldSpec>, IcebergError> {
    let mut fields = Vec::with_capacity(partition_by.len());
    for (i, entry) in partition_by.iter().enumerate() {
        if !VALID_PARTITION_TRANSFORMS.contains(&entry.transform.as_str()) {
            return Err(IcebergError::UnsupportedTransform {
                column: entry.column.clone(),
                transform: entry.transform.clone(),
            });
        }
        let source_index = schema
            .index_of(&entry.column)
            .map_err(|_| IcebergError::UnknownPartitionColumn(entry.column.clone()))?;

        let name = if entry.transform == "identity" {
            entry.column.clone()
        } else {
            format!("{}_{}", entry.column, entry.transform)
        };

        fields.push(PartitionFieldSpec {
            source_id: (source_index + 1) as i32,
            field_id: FIRST_PARTITION_FIELD_ID + i as i32,
            name,
            transform: entry.transform.clone(),
        });
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::datatypes::{DataType, Field};

    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("created_at", DataType::Utf8, false),
            Field::new("region", DataType::Utf8, false),
        ])
    }

    #[test]
    fn identity_transform_keeps_bare_column_name() {
        let entries = vec![PartitionByEntry { column: "region".to_string(), transform: "identity".to_string() }];
        let spec = build_partition_spec(&schema(), &entries).unwrap();
        assert_eq!(spec[0].name, "region");
        assert_eq!(spec[0].source_id, 3);
        assert_eq!(spec[0].field_id, 1000);
    }

    #[test]
    fn non_identity_transform_suffixes_name_and_increments_field_id() {
        let entries = vec![
            PartitionByEntry { column: "region".to_string(), transform: "identity".to_string() },
            PartitionByEntry { column: "created_at".to_string(), transform: "day".to_string() },
        ];
        let spec = build_partition_spec(&schema(), &entries).unwrap();
        assert_eq!(spec[1].name, "created_at_day");
        assert_eq!(spec[1].source_id, 2);
        assert_eq!(spec[1].field_id, 1001);
    }

    #[test]
    fn unsupported_transform_errors() {
        let entries = vec![PartitionByEntry { column: "created_at".to_string(), transform: "century".to_string() }];
        let err = build_partition_spec(&schema(), &entries).unwrap_err();
        assert!(matches!(err, IcebergError::UnsupportedTransform { .. }));
    }

    #[test]
    fn unknown_column_errors() {
        let entries = vec![PartitionByEntry { column: "missing".to_string(), transform: "identity".to_string() }];
        let err = build_partition_spec(&schema(), &entries).unwrap_err();
        assert!(matches!(err, IcebergError::UnknownPartitionColumn(_)));
    }

    #[test]
    fn empty_partition_by_yields_empty_spec() {
        assert!(build_partition_spec(&schema(), &[]).unwrap().is_empty());
    }
}
