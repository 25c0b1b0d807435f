use super::Statement;

use serde_json::Value;

impl Statement {
    pub fn drop_index(name: &str) -> Statement {
        Statement::new(
            "DROP INDEX IF EXISTS $1:name",
            vec![Value::String(name.to_string())],
        )
    }
}
