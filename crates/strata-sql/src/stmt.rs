mod alter_table;

mod catalog;

mod count;

mod create_index;

mod create_table;

mod delete;

mod distinct;

mod drop_index;

mod drop_table;

mod insert;

mod schema_record;

mod select;

mod update;

use strata_core::Result;

use serde_json::Value;

/// A SQL statement pattern and the values bound to its placeholders.
///
/// Placeholder `$1` is the first value. [`Statement::prepare`] renders the
/// text to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub pattern: String,
    pub values: Vec<Value>,
}

impl Statement {
    pub fn new(pattern: impl Into<String>, values: Vec<Value>) -> Statement {
        Statement {
            pattern: pattern.into(),
            values,
        }
    }

    /// A statement without placeholders.
    pub fn raw(sql: impl Into<String>) -> Statement {
        Statement::new(sql, vec![])
    }

    /// The statement's plan instead of its rows.
    pub fn explain(self) -> Statement {
        Statement {
            pattern: format!("EXPLAIN (FORMAT JSON) {}", self.pattern),
            values: self.values,
        }
    }

    /// The statement text to execute and the parameters it binds, in order.
    pub fn prepare(&self) -> Result<(String, Vec<Value>)> {
        crate::prepare(&self.pattern, &self.values)
    }
}

/// Joins `WHERE`-clause pieces, skipping empty ones.
fn join_clauses<'a>(clauses: impl IntoIterator<Item = &'a str>) -> String {
    clauses
        .into_iter()
        .filter(|clause| !clause.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
