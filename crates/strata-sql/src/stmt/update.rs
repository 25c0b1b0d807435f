use super::Statement;
use crate::{compile_update, compile_where};

use serde_json::Value;
use strata_core::{
    stmt::{Query, Update},
    ClassSchema, Result,
};

impl Statement {
    /// Updates every object matching `query` and returns the updated rows.
    ///
    /// `None` when `update` assigns no column.
    pub fn update(schema: &ClassSchema, query: &Query, update: &Update) -> Result<Option<Statement>> {
        let assignments = compile_update(schema, update, 2)?;
        if assignments.is_empty() {
            return Ok(None);
        }

        let filter = compile_where(schema, query, 2 + assignments.values.len())?;

        let mut pattern = format!("UPDATE $1:name SET {}", assignments.pattern);
        if !filter.is_empty() {
            pattern.push(' ');
            pattern.push_str(&filter.clause());
        }
        pattern.push_str(" RETURNING *");

        let mut values = vec![Value::String(schema.class_name.clone())];
        values.extend(assignments.values);
        values.extend(filter.values);
        Ok(Some(Statement::new(pattern, values)))
    }

    /// Updates the first object matching `query` and returns it.
    pub fn find_one_and_update(
        schema: &ClassSchema,
        query: &Query,
        update: &Update,
    ) -> Result<Option<Statement>> {
        let assignments = compile_update(schema, update, 2)?;
        if assignments.is_empty() {
            return Ok(None);
        }

        let filter = compile_where(schema, query, 2 + assignments.values.len())?;

        let subquery = if filter.is_empty() {
            "SELECT \"objectId\" FROM $1:name LIMIT 1".to_string()
        } else {
            format!("SELECT \"objectId\" FROM $1:name {} LIMIT 1", filter.clause())
        };
        let pattern = format!(
            "UPDATE $1:name SET {} WHERE \"objectId\" = ({subquery}) RETURNING *",
            assignments.pattern
        );

        let mut values = vec![Value::String(schema.class_name.clone())];
        values.extend(assignments.values);
        values.extend(filter.values);
        Ok(Some(Statement::new(pattern, values)))
    }
}
