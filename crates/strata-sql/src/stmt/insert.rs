use super::Statement;
use crate::compile::compile_insert;

use strata_core::{ClassSchema, Object, Result};

impl Statement {
    /// Inserts `object` into the class table.
    pub fn insert(schema: &ClassSchema, object: Object) -> Result<Statement> {
        compile_insert(&schema.class_name, schema, object)
    }
}
