use super::{
    key::{storage_key, POINTER_PREFIX},
    object::decode_document,
    value,
};

use bson::{Bson, Document};
use serde_json::Value;
use strata_core::{
    stmt::{pointer, Pipeline, Stage},
    ClassSchema, FieldType, Object, Result,
};

/// A pipeline rewritten for the stored document layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub stages: Vec<Document>,

    /// The `$group` key is a pointer marker; results keep only its objectId.
    pointer_group: bool,
}

/// Rewrites field references the way queries are rewritten: `$group`
/// expressions, `$match`, `$project` and `$sort` keys. Other stages pass
/// through unchanged.
pub fn transform_pipeline(schema: &ClassSchema, pipeline: &Pipeline) -> Result<Aggregation> {
    let mut stages = Vec::with_capacity(pipeline.stages.len());
    let mut pointer_group = false;

    for stage in &pipeline.stages {
        let body = match stage {
            Stage::Group(group) => {
                let mut body = Document::new();
                for (key, value) in group {
                    let key = if key == "objectId" { "_id" } else { key.as_str() };
                    let value = group_expression(schema, value)?;
                    if key == "_id" {
                        pointer_group = matches!(
                            &value,
                            Bson::String(path) if path.starts_with(&format!("${POINTER_PREFIX}"))
                        );
                    }
                    body.insert(key, value);
                }
                Bson::Document(body)
            }
            Stage::Match(filter) => Bson::Document(match_filter(schema, filter)?),
            Stage::Project(project) | Stage::Sort(project) => {
                let mut body = Document::new();
                for (key, value) in project {
                    body.insert(storage_key(schema, key), value::interior(value)?);
                }
                Bson::Document(body)
            }
            Stage::Limit(n) | Stage::Skip(n) => Bson::Int64(i64::try_from(*n).unwrap_or(i64::MAX)),
            Stage::Other { body, .. } => value::interior(body)?,
        };

        let mut document = Document::new();
        document.insert(stage.name(), body);
        stages.push(document);
    }

    Ok(Aggregation {
        stages,
        pointer_group,
    })
}

impl Aggregation {
    /// Decodes one result, renaming `_id` to `objectId`. An empty group
    /// key reads as `null`.
    pub fn decode(&self, mut document: Document, schema: &ClassSchema) -> Object {
        let Some(id) = document.remove("_id") else {
            return decode_document(document, schema);
        };

        let id = match id {
            Bson::String(marker) if self.pointer_group => match marker.split_once('$') {
                Some((_, object_id)) => Value::String(object_id.to_string()),
                None => Value::String(marker.clone()),
            },
            Bson::String(s) if s.is_empty() => Value::Null,
            Bson::Document(d) if d.is_empty() => Value::Null,
            Bson::ObjectId(oid) => Value::String(oid.to_hex()),
            other => value::to_json(&other),
        };

        let mut object = Object::new();
        object.insert("objectId".to_string(), id);
        object.extend(decode_document(document, schema));
        object
    }
}

/// `"$author"` becomes `"$_p_author"`, `"$createdAt"` `"$_created_at"`;
/// objects and arrays are rewritten recursively.
fn group_expression(schema: &ClassSchema, value: &Value) -> Result<Bson> {
    Ok(match value {
        Value::String(path) => match path.strip_prefix('$') {
            Some(field) if !field.starts_with('$') => {
                Bson::String(format!("${}", storage_key(schema, field)))
            }
            _ => Bson::String(path.clone()),
        },
        Value::Array(items) => Bson::Array(
            items
                .iter()
                .map(|item| group_expression(schema, item))
                .collect::<Result<_>>()?,
        ),
        Value::Object(object) => {
            let mut document = Document::new();
            for (key, value) in object {
                document.insert(key.clone(), group_expression(schema, value)?);
            }
            Bson::Document(document)
        }
        other => value::interior(other)?,
    })
}

/// Pointer fields match on their marker; date fields accept ISO strings.
fn match_filter(schema: &ClassSchema, filter: &Object) -> Result<Document> {
    let mut document = Document::new();

    for (key, value) in filter {
        if let Some(subfilters) = value.as_array().filter(|_| key.starts_with('$')) {
            let subfilters = subfilters
                .iter()
                .map(|subfilter| match subfilter {
                    Value::Object(subfilter) => match_filter(schema, subfilter).map(Bson::Document),
                    other => value::interior(other),
                })
                .collect::<Result<Vec<_>>>()?;
            document.insert(key.clone(), subfilters);
            continue;
        }

        let value = match schema.field(key) {
            Some(FieldType::Pointer(target)) => match value {
                Value::String(marker) if pointer::decode(marker).is_some() => {
                    Bson::String(marker.clone())
                }
                Value::String(object_id) => Bson::String(pointer::encode(target, object_id)),
                // Most likely an operator such as `$exists`.
                other => value::interior(other)?,
            },
            Some(FieldType::Date) => dates(value)?,
            _ if matches!(key.as_str(), "createdAt" | "updatedAt") => dates(value)?,
            _ => value::interior(value)?,
        };
        document.insert(storage_key(schema, key), value);
    }

    Ok(document)
}

/// ISO strings, at any depth of an operator object, become datetimes.
fn dates(value: &Value) -> Result<Bson> {
    match value {
        Value::String(iso) => value::date(iso).or_else(|_| value::interior(value)),
        Value::Object(object) if object.get("__type").is_none() => {
            let mut document = Document::new();
            for (key, value) in object {
                document.insert(key.clone(), dates(value)?);
            }
            Ok(Bson::Document(document))
        }
        other => value::interior(other),
    }
}
