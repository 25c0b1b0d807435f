use super::Statement;

use serde_json::Value;

impl Statement {
    /// Creates a named index over `columns`.
    ///
    /// With `case_insensitive`, each column is indexed as
    /// `lower(col) varchar_pattern_ops` so `lower()` comparisons use it.
    pub fn create_index(
        name: &str,
        table: &str,
        columns: &[String],
        case_insensitive: bool,
    ) -> Statement {
        let mut values = vec![
            Value::String(name.to_string()),
            Value::String(table.to_string()),
        ];

        let terms: Vec<String> = columns
            .iter()
            .map(|column| {
                values.push(Value::String(column.clone()));
                let index = values.len();
                if case_insensitive {
                    format!("lower(${index}:name) varchar_pattern_ops")
                } else {
                    format!("${index}:name")
                }
            })
            .collect();

        Statement::new(
            format!(
                "CREATE INDEX IF NOT EXISTS $1:name ON $2:name ({})",
                terms.join(", ")
            ),
            values,
        )
    }

    /// Creates the unique index enforcing `columns`, named
    /// `<table>_unique_<sorted columns>`.
    pub fn create_unique_index(table: &str, columns: &[String]) -> Statement {
        let mut sorted = columns.to_vec();
        sorted.sort();
        let name = format!("{table}_unique_{}", sorted.join("_"));

        Statement::new(
            "CREATE UNIQUE INDEX IF NOT EXISTS $2:name ON $1:name($3:name)",
            vec![
                Value::String(table.to_string()),
                Value::String(name),
                Value::Array(columns.iter().cloned().map(Value::String).collect()),
            ],
        )
    }
}
