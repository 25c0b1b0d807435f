//! Schema documents in the `_SCHEMA` collection.
//!
//! Each class is one document keyed by its name. Fields use the compact
//! legacy encoding (`"string"`, `"*_User"`, `"relation<_User>"`) and
//! class-level permissions and indexes live under `_metadata`.

use crate::{
    error::{map_error, Native},
    transform::value::{document_to_json, interior_document},
};

use bson::{doc, Bson, Document};
use futures::stream::TryStreamExt;
use indexmap::IndexMap;
use mongodb::{options::UpdateOptions, Collection, Database};
use strata_core::{
    bail,
    schema::{to_public_schema, IndexKeys, SCHEMA_CLASS},
    ClassSchema, Error, FieldType, Result,
};

/// Keys of a schema document that are not fields.
const RESERVED_KEYS: &[&str] = &["_id", "_metadata", "_client_permissions"];

/// Fields every schema document lists, stored as `"string"`.
const DEFAULT_KEYS: &[&str] = &["objectId", "updatedAt", "createdAt"];

/// The compact encoding of a field type. ACLs are implicit and have none.
pub fn to_compact_type(ty: &FieldType) -> Option<String> {
    Some(match ty {
        FieldType::String => "string".to_string(),
        FieldType::Number => "number".to_string(),
        FieldType::Boolean => "boolean".to_string(),
        FieldType::Date => "date".to_string(),
        FieldType::Object => "object".to_string(),
        FieldType::Bytes => "bytes".to_string(),
        FieldType::File => "file".to_string(),
        FieldType::GeoPoint => "geopoint".to_string(),
        FieldType::Polygon => "polygon".to_string(),
        FieldType::Array(_) => "array".to_string(),
        FieldType::Pointer(target) => format!("*{target}"),
        FieldType::Relation(target) => format!("relation<{target}>"),
        FieldType::Acl => return None,
    })
}

pub fn from_compact_type(compact: &str) -> Result<FieldType> {
    if let Some(target) = compact.strip_prefix('*') {
        return Ok(FieldType::Pointer(target.to_string()));
    }
    if let Some(target) = compact
        .strip_prefix("relation<")
        .and_then(|rest| rest.strip_suffix('>'))
    {
        return Ok(FieldType::Relation(target.to_string()));
    }

    Ok(match compact {
        "string" => FieldType::String,
        "number" => FieldType::Number,
        "boolean" => FieldType::Boolean,
        "date" => FieldType::Date,
        "map" | "object" => FieldType::Object,
        "bytes" => FieldType::Bytes,
        "file" => FieldType::File,
        "geopoint" => FieldType::GeoPoint,
        "polygon" => FieldType::Polygon,
        "array" => FieldType::Array(None),
        other => {
            return Err(Error::invalid_json(format!(
                "invalid stored field type: {other}"
            )))
        }
    })
}

/// Encodes `schema` as its `_SCHEMA` document.
pub fn to_document(schema: &ClassSchema) -> Result<Document> {
    let mut document = doc! {"_id": schema.class_name.as_str()};
    for key in DEFAULT_KEYS {
        document.insert(*key, "string");
    }

    for (name, ty) in &schema.fields {
        if DEFAULT_KEYS.contains(&name.as_str()) {
            continue;
        }
        if let Some(compact) = to_compact_type(ty) {
            document.insert(name.clone(), compact);
        }
    }

    let mut metadata = Document::new();
    if let Some(clp) = &schema.class_level_permissions {
        metadata.insert("class_permissions", interior_document(clp)?);
    }
    if !schema.indexes.is_empty() {
        let mut indexes = Document::new();
        for (name, keys) in &schema.indexes {
            indexes.insert(name.clone(), interior_document(keys)?);
        }
        metadata.insert("indexes", indexes);
    }
    if !metadata.is_empty() {
        document.insert("_metadata", metadata);
    }

    Ok(document)
}

/// Decodes a `_SCHEMA` document. The implicit default fields are not listed.
pub fn from_document(document: &Document) -> Result<ClassSchema> {
    let class_name = match document.get("_id") {
        Some(Bson::String(name)) => name.clone(),
        _ => bail!("schema document without a class name"),
    };

    let mut schema = ClassSchema::new(class_name);

    for (key, value) in document {
        if RESERVED_KEYS.contains(&key.as_str()) || DEFAULT_KEYS.contains(&key.as_str()) {
            continue;
        }
        let Bson::String(compact) = value else {
            bail!("field {key} of {} has a malformed type", schema.class_name);
        };
        schema.fields.insert(key.clone(), from_compact_type(compact)?);
    }

    if let Ok(metadata) = document.get_document("_metadata") {
        if let Ok(clp) = metadata.get_document("class_permissions") {
            schema.class_level_permissions = Some(document_to_json(clp));
        }
        if let Ok(indexes) = metadata.get_document("indexes") {
            for (name, keys) in indexes {
                if let Bson::Document(keys) = keys {
                    schema.indexes.insert(name.clone(), document_to_json(keys));
                }
            }
        }
    }

    Ok(schema)
}

/// The `_SCHEMA` collection.
pub(crate) struct SchemaCollection {
    collection: Collection<Document>,
}

impl SchemaCollection {
    pub(crate) fn new(database: &Database) -> SchemaCollection {
        SchemaCollection {
            collection: database.collection(SCHEMA_CLASS),
        }
    }

    pub(crate) async fn fetch_all(&self) -> Result<Vec<ClassSchema>> {
        let documents: Vec<Document> = self
            .collection
            .find(doc! {})
            .await
            .map_err(map_error)?
            .try_collect()
            .await
            .map_err(map_error)?;

        documents
            .iter()
            .map(|document| Ok(to_public_schema(&from_document(document)?)))
            .collect()
    }

    pub(crate) async fn fetch_one(&self, class_name: &str) -> Result<Option<ClassSchema>> {
        let document = self
            .collection
            .find_one(doc! {"_id": class_name})
            .await
            .map_err(map_error)?;

        document
            .map(|document| Ok(to_public_schema(&from_document(&document)?)))
            .transpose()
    }

    /// Records a new class. Fails with `DUPLICATE_VALUE` when it is
    /// already recorded.
    pub(crate) async fn insert(&self, schema: &ClassSchema) -> Result<()> {
        match self.collection.insert_one(to_document(schema)?).await {
            Ok(_) => Ok(()),
            Err(err) if Native::of(&err) == Some(Native::DuplicateKey) => Err(
                Error::duplicate_value(format!("Class {} already exists.", schema.class_name)),
            ),
            Err(err) => Err(map_error(err)),
        }
    }

    pub(crate) async fn update(&self, class_name: &str, update: Document) -> Result<()> {
        self.collection
            .update_one(doc! {"_id": class_name}, update)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    pub(crate) async fn set_field(
        &self,
        class_name: &str,
        field_name: &str,
        ty: &FieldType,
    ) -> Result<()> {
        let Some(compact) = to_compact_type(ty) else {
            return Ok(());
        };
        let mut set = Document::new();
        set.insert(field_name, compact);
        self.update(class_name, doc! {"$set": set}).await
    }

    pub(crate) async fn set_metadata(&self, class_name: &str, key: &str, value: Bson) -> Result<()> {
        let mut set = Document::new();
        set.insert(format!("_metadata.{key}"), value);
        self.update(class_name, doc! {"$set": set}).await
    }

    /// Records a field, creating the class record when there is none. A
    /// field that is already recorded is rejected.
    pub(crate) async fn add_field_if_not_exists(
        &self,
        class_name: &str,
        field_name: &str,
        ty: &FieldType,
    ) -> Result<()> {
        let Some(compact) = to_compact_type(ty) else {
            return Ok(());
        };

        let mut filter = doc! {"_id": class_name};
        filter.insert(field_name, doc! {"$exists": false});
        let mut set = Document::new();
        set.insert(field_name, compact);

        let mut options = UpdateOptions::default();
        options.upsert = Some(true);

        // A recorded field fails the filter, so the upsert collides on `_id`.
        match self
            .collection
            .update_one(filter, doc! {"$set": set})
            .with_options(options)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if Native::of(&err) == Some(Native::DuplicateKey) => {
                bail!("Attempted to add a field that already exists")
            }
            Err(err) => Err(map_error(err)),
        }
    }

    pub(crate) async fn unset_fields(&self, class_name: &str, field_names: &[String]) -> Result<()> {
        let mut unset = Document::new();
        for name in field_names {
            unset.insert(name.clone(), "");
            unset.insert(format!("_metadata.fields_options.{name}"), "");
        }
        self.update(class_name, doc! {"$unset": unset}).await
    }

    pub(crate) async fn delete(&self, class_name: &str) -> Result<()> {
        self.collection
            .delete_one(doc! {"_id": class_name})
            .await
            .map_err(map_error)?;
        Ok(())
    }
}

/// Index metadata as stored under `_metadata.indexes`.
pub(crate) fn indexes_bson(indexes: &IndexMap<String, IndexKeys>) -> Result<Bson> {
    let mut document = Document::new();
    for (name, keys) in indexes {
        document.insert(name.clone(), interior_document(keys)?);
    }
    Ok(Bson::Document(document))
}
