use super::Statement;
use crate::ident::quote_ident;

use serde_json::Value;
use strata_core::{schema::SCHEMA_CLASS, ClassSchema, FieldType, Result};

/// `"_SCHEMA"`, quoted.
fn schema_table() -> String {
    quote_ident(SCHEMA_CLASS)
}

impl Statement {
    /// Records a new class. Fails with a unique violation when the class is
    /// already recorded.
    pub fn insert_class_record(schema: &ClassSchema) -> Result<Statement> {
        Ok(Statement::new(
            format!(
                "INSERT INTO {} (\"className\", \"schema\", \"isParseClass\") VALUES ($1, $2::jsonb, true)",
                schema_table()
            ),
            vec![Value::String(schema.class_name.clone()), schema.to_json()?],
        ))
    }

    pub fn select_class_records() -> Statement {
        Statement::raw(format!("SELECT * FROM {}", schema_table()))
    }

    pub fn select_class_record(class_name: &str) -> Statement {
        Statement::new(
            format!("SELECT * FROM {} WHERE \"className\" = $1", schema_table()),
            vec![Value::String(class_name.to_string())],
        )
    }

    /// Overwrites a class's whole record.
    pub fn replace_class_record(schema: &ClassSchema) -> Result<Statement> {
        Ok(Statement::new(
            format!(
                "UPDATE {} SET \"schema\" = $2::jsonb WHERE \"className\" = $1",
                schema_table()
            ),
            vec![Value::String(schema.class_name.clone()), schema.to_json()?],
        ))
    }

    /// Sets one top-level key (`classLevelPermissions`, `indexes`) of a
    /// class's record.
    pub fn set_class_record_key(class_name: &str, key: &str, value: Value) -> Statement {
        Statement::new(
            format!(
                "UPDATE {} SET \"schema\" = json_object_set_key(\"schema\", $2::text, $3::jsonb) WHERE \"className\" = $1",
                schema_table()
            ),
            vec![
                Value::String(class_name.to_string()),
                Value::String(key.to_string()),
                value,
            ],
        )
    }

    /// Records `field` with type `ty`, replacing any previous type.
    pub fn set_class_record_field(class_name: &str, field: &str, ty: &FieldType) -> Result<Statement> {
        Ok(Statement::new(
            format!(
                "UPDATE {} SET \"schema\" = jsonb_set(\"schema\", $2::text[], $3::jsonb) WHERE \"className\" = $1",
                schema_table()
            ),
            vec![
                Value::String(class_name.to_string()),
                Value::Array(vec![Value::from("fields"), Value::String(field.to_string())]),
                serde_json::to_value(ty)?,
            ],
        ))
    }

    /// Returns a row only when `field` is already recorded for the class.
    pub fn select_class_record_field(class_name: &str, field: &str) -> Statement {
        Statement::new(
            format!(
                "SELECT \"schema\" FROM {} WHERE \"className\" = $1 AND (\"schema\"::json->'fields'->$2) IS NOT NULL",
                schema_table()
            ),
            vec![
                Value::String(class_name.to_string()),
                Value::String(field.to_string()),
            ],
        )
    }

    pub fn delete_class_record(class_name: &str) -> Statement {
        Statement::new(
            format!("DELETE FROM {} WHERE \"className\" = $1", schema_table()),
            vec![Value::String(class_name.to_string())],
        )
    }
}
