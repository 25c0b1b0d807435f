use super::Statement;

use serde_json::Value;

impl Statement {
    /// Adds a column, leaving an existing one untouched.
    pub fn add_column(table: &str, column: &str, column_type: &str) -> Statement {
        Statement::new(
            "ALTER TABLE $1:name ADD COLUMN IF NOT EXISTS $2:name $3:raw",
            vec![
                Value::String(table.to_string()),
                Value::String(column.to_string()),
                Value::String(column_type.to_string()),
            ],
        )
    }

    /// Drops columns that exist. `None` when there is nothing to drop.
    pub fn drop_columns(table: &str, columns: &[String]) -> Option<Statement> {
        if columns.is_empty() {
            return None;
        }

        let mut values = vec![Value::String(table.to_string())];
        let mut drops = vec![];
        for column in columns {
            values.push(Value::String(column.clone()));
            drops.push(format!("DROP COLUMN IF EXISTS ${}:name", values.len()));
        }

        Some(Statement::new(
            format!("ALTER TABLE $1:name {}", drops.join(", ")),
            values,
        ))
    }
}
