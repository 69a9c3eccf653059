//! Bordered text-table rendering of a violation result set's first few
//! rows, with per-cell truncation so a failing test doesn't dump
//! unbounded amounts of potentially sensitive data into run logs.

use datafusion::arrow::array::{Array, RecordBatch};
use datafusion::arrow::util::display::{ArrayFormatter, FormatOptions};

use crate::error::QualityError;

const MAX_SAMPLE_ROWS: usize = 3;
const MAX_CELL_LENGTH: usize = 40;

fn truncate_cell(value: &str) -> String {
    if value.chars().count() <= MAX_CELL_LENGTH {
        return value.to_string();
    }
    let head: String = value.chars().take(MAX_CELL_LENGTH - 3).collect();
    format!("{head}...")
}

fn cell_to_string(array: &dyn Array, row: usize) -> Result<String, QualityError> {
    if array.is_null(row) {
        return Ok("None".to_string());
    }
    let formatter = ArrayFormatter::try_new(array, &FormatOptions::default())?;
    Ok(formatter.value(row).to_string())
}

pub fn total_row_count(batches: &[RecordBatch]) -> u64 {
    batches.iter().map(|b| b.num_rows() as u64).sum()
}

/// Render the first `MAX_SAMPLE_ROWS` rows across `batches` as a bordered
/// text table. Empty string if `batches` has no rows.
pub fn format_sample_rows(batches: &[RecordBatch]) -> Result<String, QualityError> {
    let total_rows = total_row_count(batches) as usize;
    let Some(first) = batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(String::new());
    };
    let columns: Vec<String> = first.schema().fields().iter().map(|f| f.name().clone()).collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    'outer: for batch in batches {
        for row in 0..batch.num_rows() {
            if rows.len() >= MAX_SAMPLE_ROWS {
                break 'outer;
            }
            let mut values = Vec::with_capacity(columns.len());
            for col in 0..batch.num_columns() {
                let value = cell_to_string(batch.column(col).as_ref(), row)?;
                values.push(truncate_cell(&value));
            }
            rows.push(values);
        }
    }

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| rows.iter().map(|r| r[i].len()).chain(std::iter::once(name.len())).max().unwrap_or(0))
        .collect();

    let header = columns
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{:<width$}", name, width = widths[i]))
        .collect::<Vec<_>>()
        .join(" | ");
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-");

    let mut lines = vec![header, separator];
    for row in &rows {
        let line = row
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{:<width$}", v, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ");
        lines.push(line);
    }
    if total_rows > rows.len() {
        lines.push(format!("... and {} more row(s)", total_rows - rows.len()));
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::{Int64Array, StringArray};
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch(ids: Vec<i64>, names: Vec<&str>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false), Field::new("name", DataType::Utf8, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(ids)), Arc::new(StringArray::from(names))]).unwrap()
    }

    #[test]
    fn empty_batches_render_empty_string() {
        assert_eq!(format_sample_rows(&[]).unwrap(), "");
    }

    #[test]
    fn renders_header_and_rows() {
        let b = batch(vec![1, 2], vec!["alice", "bob"]);
        let rendered = format_sample_rows(&[b]).unwrap();
        assert!(rendered.contains("id"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn caps_at_three_rows_and_notes_remainder() {
        let b = batch(vec![1, 2, 3, 4, 5], vec!["a", "b", "c", "d", "e"]);
        let rendered = format_sample_rows(&[b]).unwrap();
        assert!(rendered.contains("and 2 more row(s)"));
    }

    #[test]
    fn truncates_long_cells() {
        let long = "x".repeat(100);
        let b = batch(vec![1], vec![&long]);
        let rendered = format_sample_rows(&[b]).unwrap();
        assert!(rendered.contains("..."));
        assert!(!rendered.contains(&long));
    }
}
