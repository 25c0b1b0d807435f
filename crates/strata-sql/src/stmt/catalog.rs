use super::Statement;

use serde_json::Value;

impl Statement {
    /// One boolean column, `exists`, telling whether `table` exists.
    pub fn table_exists(table: &str) -> Statement {
        Statement::new(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
            vec![Value::String(table.to_string())],
        )
    }

    /// The names of `table`'s columns, in a `column_name` column.
    pub fn table_columns(table: &str) -> Statement {
        Statement::new(
            "SELECT column_name FROM information_schema.columns WHERE table_name = $1",
            vec![Value::String(table.to_string())],
        )
    }

    /// `indexname` and `indexdef` of every index on `table`.
    pub fn table_indexes(table: &str) -> Statement {
        Statement::new(
            "SELECT indexname, indexdef FROM pg_indexes WHERE tablename = $1",
            vec![Value::String(table.to_string())],
        )
    }
}
