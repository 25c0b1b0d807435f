use super::{join_clauses, Statement};
use crate::{ident::json_path, Emitter, Where};

use serde_json::Value;
use strata_core::{schema::DEFAULT_FIELDS, stmt::Query, ClassSchema, FindOptions, Result};

impl Statement {
    /// Selects the objects matching `query`, honoring the sort, paging and
    /// projection of `options`.
    pub fn select(schema: &ClassSchema, query: &Query, options: &FindOptions) -> Result<Statement> {
        let filter = Where::compile(schema, query, 2, options.case_insensitive)?;
        let mut e = Emitter::new(2 + filter.values.len());

        let limit = options.limit.map(|limit| format!("LIMIT {}", e.bind(limit)));
        let offset = options.skip.map(|skip| format!("OFFSET {}", e.bind(skip)));

        let order_by = if !filter.sorts.is_empty() {
            format!("ORDER BY {}", filter.sorts.join(", "))
        } else if !options.sort.is_empty() {
            let terms: Vec<String> = options
                .sort
                .iter()
                .map(|(field, direction)| format!("{} {}", json_path(field), direction.sql()))
                .collect();
            format!("ORDER BY {}", terms.join(", "))
        } else {
            String::new()
        };

        let columns = match &options.keys {
            Some(keys) => projection(schema, keys)
                .into_iter()
                .map(|key| e.bind_name(key))
                .collect::<Vec<_>>()
                .join(", "),
            None => "*".to_string(),
        };

        let where_clause = filter.clause();
        let pattern = join_clauses([
            format!("SELECT {columns} FROM $1:name").as_str(),
            where_clause.as_str(),
            order_by.as_str(),
            limit.as_deref().unwrap_or_default(),
            offset.as_deref().unwrap_or_default(),
        ]);

        let mut values = vec![Value::String(schema.class_name.clone())];
        values.extend(filter.values);
        values.extend(e.into_values());

        let statement = Statement::new(pattern, values);
        Ok(if options.explain {
            statement.explain()
        } else {
            statement
        })
    }
}

/// The columns a `keys` projection selects. `ACL` expands to the permission
/// arrays and relation fields, stored elsewhere, are dropped. The default
/// fields are always selected.
fn projection(schema: &ClassSchema, keys: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect();

    for key in keys {
        let selected = match key.as_str() {
            "ACL" => vec!["_rperm", "_wperm"],
            key if schema.field(key).is_some_and(|ty| !ty.is_relation()) => vec![key],
            _ => vec![],
        };
        for column in selected {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
    }

    columns
}
