use super::Statement;
use crate::{ident::quote_ident, ty::column_type};

use serde_json::Value;
use strata_core::{
    schema::{join_table_name, to_storage_schema, SCHEMA_CLASS},
    ClassSchema, FieldType,
};

impl Statement {
    /// Creates the table recording every class's schema.
    pub fn create_schema_table() -> Statement {
        Statement::new(
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\"className\" varChar(120), \"schema\" jsonb, \"isParseClass\" bool, PRIMARY KEY (\"className\"))",
                quote_ident(SCHEMA_CLASS)
            ),
            vec![],
        )
    }

    /// Creates the table backing `schema`'s class.
    ///
    /// `objectId` is the primary key; relation fields get join tables of
    /// their own (see [`Statement::join_tables`]).
    pub fn create_table(schema: &ClassSchema) -> Statement {
        let storage = to_storage_schema(schema);

        let mut definitions = vec![];
        let mut values = vec![Value::String(schema.class_name.clone())];

        let mut fields: Vec<(&str, &FieldType)> = vec![
            ("objectId", &FieldType::String),
            ("createdAt", &FieldType::Date),
            ("updatedAt", &FieldType::Date),
        ];
        fields.extend(
            storage
                .fields
                .iter()
                .map(|(name, ty)| (name.as_str(), ty))
                .filter(|(name, _)| !matches!(*name, "objectId" | "createdAt" | "updatedAt")),
        );

        for (name, ty) in fields {
            let Some(column_type) = column_type(ty) else {
                continue;
            };
            values.push(Value::String(name.to_string()));
            let index = values.len();
            if name == "objectId" {
                definitions.push(format!("${index}:name {column_type} PRIMARY KEY"));
            } else {
                definitions.push(format!("${index}:name {column_type}"));
            }
        }

        Statement::new(
            format!("CREATE TABLE IF NOT EXISTS $1:name ({})", definitions.join(", ")),
            values,
        )
    }

    /// One join table per relation field of `schema`.
    pub fn join_tables(schema: &ClassSchema) -> Vec<Statement> {
        schema
            .relation_fields()
            .map(|(field, _)| Statement::create_join_table(&join_table_name(field, &schema.class_name)))
            .collect()
    }

    pub fn create_join_table(name: &str) -> Statement {
        Statement::new(
            "CREATE TABLE IF NOT EXISTS $1:name (\"relatedId\" varChar(120), \"owningId\" varChar(120), PRIMARY KEY(\"relatedId\", \"owningId\"))",
            vec![Value::String(name.to_string())],
        )
    }
}
