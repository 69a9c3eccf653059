//! Deduplicating `new_data` on `unique_key` before it's merged into the
//! target table. Two rows in the same batch sharing a unique key would
//! otherwise produce duplicate or ambiguous matches in the ANTI JOIN/UNION
//! ALL SQL built in `fallback.rs`; dedup picks one deterministically before
//! that SQL ever runs.

use datafusion::arrow::datatypes::Schema as ArrowSchema;

use crate::error::IcebergError;
use crate::identifiers::{quote_identifier, validate_identifiers};

/// Build a bare `SELECT` (no enclosing parens/alias — callers wrap it
/// wherever they splice it into a larger query) over `view` that keeps
/// exactly one row per distinct `unique_key` value. The survivor is the
/// last occurrence by input position (a positional `ROW_NUMBER() OVER ()`
/// assigned before the dedup window), not an engine-arbitrary row among
/// ties on the key.
pub fn dedup_subquery(
    view: &str,
    unique_key: &[String],
    schema: &ArrowSchema,
) -> Result<String, IcebergError> {
    validate_identifiers(unique_key.iter().map(String::as_str))?;
    let partition_cols = unique_key
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    let all_cols = schema
        .fields()
        .iter()
        .map(|f| quote_identifier(f.name()))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");

    Ok(format!(
        "SELECT {all_cols} FROM (SELECT {all_cols}, ROW_NUMBER() OVER (PARTITION BY {partition_cols} ORDER BY __rat_dedup_pos DESC) AS __rat_dedup_rn FROM (SELECT {all_cols}, ROW_NUMBER() OVER () AS __rat_dedup_pos FROM {view}) AS __rat_dedup_positioned) AS __rat_dedup_ranked WHERE __rat_dedup_rn = 1"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::datatypes::{DataType, Field};

    #[test]
    fn builds_row_number_dedup_subquery() {
        let schema = ArrowSchema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("value", DataType::Utf8, true),
        ]);
        let sql = dedup_subquery("new_data", &["id".to_string()], &schema).unwrap();
        assert!(sql.contains("PARTITION BY \"id\" ORDER BY __rat_dedup_pos DESC"));
        assert!(sql.contains("ROW_NUMBER() OVER () AS __rat_dedup_pos"));
        assert!(sql.contains("__rat_dedup_rn = 1"));
    }

    #[test]
    fn rejects_unsafe_unique_key_column() {
        let schema = ArrowSchema::new(vec![Field::new("id", DataType::Int64, false)]);
        assert!(dedup_subquery("new_data", &["id; drop table x".to_string()], &schema).is_err());
    }
}
