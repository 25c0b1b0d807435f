use crate::{
    error::{map_error, Native},
    transform::{key::storage_key, value},
};

use bson::{Bson, Document};
use mongodb::{options::IndexOptions, Collection, IndexModel};
use strata_core::{
    schema::{IndexKeys, IndexPlan},
    ClassSchema, Result,
};

/// The key document of an index. Public field names are renamed to their
/// stored form; `_p_` keys and directions or kinds pass through.
pub(crate) fn keys_document(schema: &ClassSchema, keys: &IndexKeys) -> Result<Document> {
    let mut document = Document::new();
    for (field, kind) in keys {
        let field = if field.starts_with('_') {
            field.clone()
        } else {
            storage_key(schema, field)
        };
        document.insert(field, value::interior(kind)?);
    }
    Ok(document)
}

pub(crate) fn index_model(
    schema: &ClassSchema,
    name: Option<&str>,
    keys: &IndexKeys,
) -> Result<IndexModel> {
    let mut options = IndexOptions::default();
    options.name = name.map(str::to_string);

    Ok(IndexModel::builder()
        .keys(keys_document(schema, keys)?)
        .options(options)
        .build())
}

/// A sparse unique index, so objects without the fields do not collide.
pub(crate) fn unique_index_model(schema: &ClassSchema, field_names: &[String]) -> IndexModel {
    let mut keys = Document::new();
    for field in field_names {
        keys.insert(storage_key(schema, field), 1);
    }

    let mut options = IndexOptions::default();
    options.unique = Some(true);
    options.sparse = Some(true);

    IndexModel::builder().keys(keys).options(options).build()
}

/// An index as reported by `listIndexes`.
pub(crate) fn index_keys(model: &IndexModel) -> IndexKeys {
    value::document_to_json(&model.keys)
}

pub(crate) fn index_name(model: &IndexModel) -> Option<String> {
    model.options.as_ref().and_then(|options| options.name.clone())
}

/// A `2dsphere` index over a stored polygon field.
pub(crate) fn geo_index_model(field: &str) -> IndexModel {
    let mut keys = Document::new();
    keys.insert(field, Bson::String("2dsphere".to_string()));
    IndexModel::builder().keys(keys).build()
}

/// Drops and builds the indexes of `plan`.
pub(crate) async fn apply_plan(
    collection: &Collection<Document>,
    schema: &ClassSchema,
    plan: &IndexPlan,
) -> Result<()> {
    for name in &plan.delete {
        tracing::debug!(%name, "dropping index");
        collection.drop_index(name).await.map_err(map_error)?;
    }

    if !plan.create.is_empty() {
        let models = plan
            .create
            .iter()
            .map(|(name, keys)| index_model(schema, Some(name), keys))
            .collect::<Result<Vec<_>>>()?;
        collection.create_indexes(models).await.map_err(map_error)?;
    }

    Ok(())
}

/// Builds `model`, keeping an equivalent index that already exists under
/// another name or with other options.
pub(crate) async fn create_tolerating_conflict(
    collection: &Collection<Document>,
    model: IndexModel,
) -> Result<()> {
    match collection.create_index(model).await {
        Ok(_) => Ok(()),
        Err(err)
            if matches!(
                Native::of(&err),
                Some(Native::IndexOptionsConflict | Native::IndexKeySpecsConflict)
            ) =>
        {
            tracing::debug!("index already exists");
            Ok(())
        }
        Err(err) => Err(map_error(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;
    use strata_core::FieldType;

    fn keys(value: serde_json::Value) -> IndexKeys {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn keys_use_stored_names() {
        let schema = ClassSchema::new("Post").with_field("author", FieldType::Pointer("_User".into()));
        let document = keys_document(
            &schema,
            &keys(json!({"author": 1, "createdAt": -1, "title": "text"})),
        )
        .unwrap();
        assert_eq!(
            document,
            doc! {"_p_author": 1, "_created_at": -1, "title": "text"}
        );
    }

    #[test]
    fn stored_keys_pass_through() {
        let schema = ClassSchema::new("Post");
        let document = keys_document(&schema, &keys(json!({"_p_author": 1, "_id": 1}))).unwrap();
        assert_eq!(document, doc! {"_p_author": 1, "_id": 1});
    }

    #[test]
    fn unique_index_is_sparse() {
        let model = unique_index_model(&ClassSchema::new("_User"), &["username".to_string()]);
        assert_eq!(model.keys, doc! {"username": 1});
        let options = model.options.unwrap();
        assert_eq!(options.unique, Some(true));
        assert_eq!(options.sparse, Some(true));
    }
}
