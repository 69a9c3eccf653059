//! Arrow `RecordBatch` -> wire JSON conversion for `ExecuteQuery` and
//! `PreviewTable`. Kept local to this binary rather than in `rat-engine`
//! since it's pure wire-format glue, not engine behavior.

use datafusion::arrow::array::{
    Array, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, Int8Array, RecordBatch, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use datafusion::arrow::datatypes::Schema as ArrowSchema;
use serde_json::{Map, Value};

use rat_rpc::ColumnMeta;

pub fn columns_from_schema(schema: &ArrowSchema) -> Vec<ColumnMeta> {
    schema
        .fields()
        .iter()
        .map(|f| ColumnMeta { name: f.name().clone(), data_type: f.data_type().to_string() })
        .collect()
}

/// Render one cell as a `serde_json::Value`. Falls back to the Arrow
/// `Debug` representation for array types without an explicit branch
/// (e.g. nested list/struct columns) rather than failing the whole query.
fn cell_value(array: &dyn Array, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    macro_rules! downcast_num {
        ($ty:ty) => {
            array.as_any().downcast_ref::<$ty>().map(|a| Value::from(a.value(row)))
        };
    }
    None.or_else(|| downcast_num!(Int8Array))
        .or_else(|| downcast_num!(Int16Array))
        .or_else(|| downcast_num!(Int32Array))
        .or_else(|| downcast_num!(Int64Array))
        .or_else(|| downcast_num!(UInt8Array))
        .or_else(|| downcast_num!(UInt16Array))
        .or_else(|| downcast_num!(UInt32Array))
        .or_else(|| downcast_num!(UInt64Array))
        .or_else(|| downcast_num!(Float32Array))
        .or_else(|| downcast_num!(Float64Array))
        .or_else(|| downcast_num!(BooleanArray))
        .or_else(|| array.as_any().downcast_ref::<StringArray>().map(|a| Value::from(a.value(row))))
        .or_else(|| {
            array
                .as_any()
                .downcast_ref::<Date32Array>()
                .map(|a| Value::from(a.value_as_date(row).map(|d| d.to_string()).unwrap_or_default()))
        })
        .or_else(|| {
            array
                .as_any()
                .downcast_ref::<TimestampSecondArray>()
                .map(|a| Value::from(a.value_as_datetime(row).map(|d| d.to_string()).unwrap_or_default()))
        })
        .or_else(|| {
            array
                .as_any()
                .downcast_ref::<TimestampMillisecondArray>()
                .map(|a| Value::from(a.value_as_datetime(row).map(|d| d.to_string()).unwrap_or_default()))
        })
        .or_else(|| {
            array
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .map(|a| Value::from(a.value_as_datetime(row).map(|d| d.to_string()).unwrap_or_default()))
        })
        .or_else(|| {
            array
                .as_any()
                .downcast_ref::<TimestampNanosecondArray>()
                .map(|a| Value::from(a.value_as_datetime(row).map(|d| d.to_string()).unwrap_or_default()))
        })
        .unwrap_or_else(|| Value::from(datafusion::arrow::util::display::array_value_to_string(array, row).unwrap_or_default()))
}

/// Flatten a slice of batches into JSON row objects, capped at `limit` rows.
pub fn batches_to_json_rows(batches: &[RecordBatch], limit: usize) -> Vec<Map<String, Value>> {
    let mut out = Vec::new();
    'outer: for batch in batches {
        let schema = batch.schema();
        for row in 0..batch.num_rows() {
            if out.len() >= limit {
                break 'outer;
            }
            let mut map = Map::with_capacity(batch.num_columns());
            for (col_idx, field) in schema.fields().iter().enumerate() {
                map.insert(field.name().clone(), cell_value(batch.column(col_idx).as_ref(), row));
            }
            out.push(map);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::datatypes::{DataType, Field};
    use std::sync::Arc;

    #[test]
    fn converts_mixed_columns_to_json_rows() {
        let schema = Arc::new(ArrowSchema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("a"), None])),
            ],
        )
        .unwrap();

        let rows = batches_to_json_rows(&[batch], 10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], Value::from(1));
        assert_eq!(rows[0]["name"], Value::from("a"));
        assert_eq!(rows[1]["name"], Value::Null);
    }

    #[test]
    fn respects_row_limit_across_batches() {
        let schema = Arc::new(ArrowSchema::new(vec![Field::new("n", DataType::Int32, false)]));
        let b1 = RecordBatch::try_new(schema.clone(), vec![Arc::new(Int32Array::from(vec![1, 2, 3]))]).unwrap();
        let b2 = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![4, 5]))]).unwrap();
        let rows = batches_to_json_rows(&[b1, b2], 4);
        assert_eq!(rows.len(), 4);
    }
}
