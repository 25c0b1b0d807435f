use crate::{error::Native, index, transaction::Transaction, value::row_to_object};

use serde_json::Value;
use strata_core::{
    schema::{to_public_schema, IndexPlan},
    ClassSchema, Error, Object, Result,
};
use strata_sql::Statement;
use tokio_postgres::Row;

/// Failures a concurrent bootstrap of `_SCHEMA` can raise.
pub(crate) const BOOTSTRAP_RACES: &[Native] = &[
    Native::DuplicateRelation,
    Native::UniqueViolation,
    Native::DuplicateObject,
];

pub(crate) async fn ensure_schema_table(tx: &mut Transaction<'_>) -> Result<()> {
    tx.tolerate(&Statement::create_schema_table(), BOOTSTRAP_RACES)
        .await?;
    Ok(())
}

/// Creates the class table and its join tables. An existing class table is
/// left alone.
pub(crate) async fn create_table(tx: &mut Transaction<'_>, schema: &ClassSchema) -> Result<()> {
    ensure_schema_table(tx).await?;

    if tx
        .tolerate(&Statement::create_table(schema), &[Native::DuplicateRelation])
        .await?
        .is_some()
    {
        tracing::debug!(class_name = %schema.class_name, "class table already exists");
    }

    for statement in Statement::join_tables(schema) {
        tx.execute(&statement).await?;
    }
    Ok(())
}

/// Creates a class: its tables, its schema record and its declared indexes.
/// Returns the schema as recorded.
pub(crate) async fn create_class(tx: &mut Transaction<'_>, schema: &ClassSchema) -> Result<ClassSchema> {
    create_table(tx, schema).await?;

    let mut record = schema.clone();
    let plan = if schema.indexes.is_empty() {
        IndexPlan::default()
    } else {
        let submitted: Object = schema
            .indexes
            .iter()
            .map(|(name, keys)| (name.clone(), Value::Object(keys.clone())))
            .collect();
        let plan = IndexPlan::diff(&submitted, &Default::default(), &schema.fields)?;
        record.indexes = plan.indexes.clone();
        plan
    };

    let inserted = tx
        .tolerate(
            &Statement::insert_class_record(&record)?,
            &[Native::UniqueViolation],
        )
        .await?;
    if inserted.is_some() {
        return Err(Error::duplicate_value(format!(
            "Class {} already exists.",
            schema.class_name
        )));
    }

    for (name, keys) in &plan.create {
        tx.execute(&index::create_index_statement(&schema.class_name, name, keys))
            .await?;
    }

    tracing::info!(class_name = %schema.class_name, "created class");
    Ok(record)
}

/// Reads a `_SCHEMA` row into the public schema it records.
pub(crate) fn load_record(row: &Row) -> Result<ClassSchema> {
    let mut row = row_to_object(row)?;

    let mut record = match row.remove("schema") {
        Some(Value::Object(record)) => record,
        _ => Object::new(),
    };
    if !record.contains_key("className") {
        if let Some(class_name) = row.remove("className") {
            record.insert("className".to_string(), class_name);
        }
    }

    let schema = ClassSchema::from_json(Value::Object(record))?;
    Ok(to_public_schema(&schema))
}
