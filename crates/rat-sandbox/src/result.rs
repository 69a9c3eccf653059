//! The opaque value a script assigns to `result`. Scripts never see Arrow
//! data directly — they run a query through `engine.sql(...)` and hand the
//! whole result straight back to `result`, the same shape as the Python
//! sandbox's `result = duckdb_conn.sql(query).arrow()`.

use datafusion::arrow::array::RecordBatch;
use mlua::{UserData, UserDataMethods};

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub batches: Vec<RecordBatch>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

impl UserData for QueryResult {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("row_count", |_, this, ()| Ok(this.row_count()));
    }
}
