use super::{join_clauses, Statement};
use crate::{compile_where, ident::json_path};

use serde_json::Value;
use strata_core::{stmt::Query, ClassSchema, FieldType, Result};

impl Statement {
    /// Selects the distinct values of `field` among objects matching `query`
    /// as a `value` column. Array fields yield their elements; dotted fields
    /// reach into object columns.
    pub fn distinct(schema: &ClassSchema, query: &Query, field: &str) -> Result<Statement> {
        let (expr, target) = if field.contains('.') {
            ("$2:raw", Value::String(json_path(field)))
        } else {
            let expr = match schema.field(field) {
                Some(ty) if ty.is_string_array() => "unnest($2:name)",
                Some(FieldType::Array(_)) => "jsonb_array_elements($2:name)",
                _ => "$2:name",
            };
            (expr, Value::String(field.to_string()))
        };

        let filter = compile_where(schema, query, 3)?;
        let where_clause = filter.clause();
        let select = format!("SELECT DISTINCT {expr} AS \"value\" FROM $1:name");
        let pattern = join_clauses([select.as_str(), where_clause.as_str()]);

        let mut values = vec![Value::String(schema.class_name.clone()), target];
        values.extend(filter.values);
        Ok(Statement::new(pattern, values))
    }
}
