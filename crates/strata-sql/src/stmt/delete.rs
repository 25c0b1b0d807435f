use super::Statement;
use crate::compile_where;

use serde_json::Value;
use strata_core::{stmt::Query, ClassSchema, Result};

impl Statement {
    /// Deletes the objects matching `query`, selecting how many were deleted.
    pub fn delete(schema: &ClassSchema, query: &Query) -> Result<Statement> {
        let filter = compile_where(schema, query, 2)?;
        let predicate = if filter.is_empty() {
            "TRUE"
        } else {
            filter.pattern.as_str()
        };

        let pattern = format!(
            "WITH deleted AS (DELETE FROM $1:name WHERE {predicate} RETURNING *) SELECT count(*) FROM deleted"
        );

        let mut values = vec![Value::String(schema.class_name.clone())];
        values.extend(filter.values);
        Ok(Statement::new(pattern, values))
    }
}
