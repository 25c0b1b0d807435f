use super::Statement;

use serde_json::Value;

impl Statement {
    /// Drops a table if it exists.
    pub fn drop_table(name: &str) -> Statement {
        Statement::new(
            "DROP TABLE IF EXISTS $1:name",
            vec![Value::String(name.to_string())],
        )
    }

    /// Empties a table, keeping its definition.
    pub fn truncate_table(name: &str) -> Statement {
        Statement::new(
            "TRUNCATE TABLE $1:name",
            vec![Value::String(name.to_string())],
        )
    }
}
