use super::Statement;
use crate::compile_where;

use serde_json::Value;
use strata_core::{stmt::Query, ClassSchema, Result};

impl Statement {
    /// Counts the objects matching `query`.
    pub fn count(schema: &ClassSchema, query: &Query) -> Result<Statement> {
        let filter = compile_where(schema, query, 2)?;

        let mut pattern = "SELECT count(*) FROM $1:name".to_string();
        if !filter.is_empty() {
            pattern.push(' ');
            pattern.push_str(&filter.clause());
        }

        let mut values = vec![Value::String(schema.class_name.clone())];
        values.extend(filter.values);
        Ok(Statement::new(pattern, values))
    }

    /// The planner's row estimate for a table, without scanning it.
    pub fn estimated_count(table: &str) -> Statement {
        Statement::new(
            "SELECT reltuples AS approximate_row_count FROM pg_class WHERE relname = $1",
            vec![Value::String(table.to_string())],
        )
    }
}
