use super::{
    key::{auth_data_provider, public_key, AUTH_DATA_PREFIX, POINTER_PREFIX},
    update::set_value,
    value::{self, geo_point_json, polygon_json, to_json},
};

use bson::{Bson, Document};
use serde_json::{json, Value};
use strata_core::{
    stmt::{expand_dot_fields, pointer, split_acl, validate_keys},
    ClassSchema, FieldType, Object, Result,
};

/// Encodes a new object as the document to insert.
///
/// Dotted keys are expanded first. `ACL` splits into the permission arrays
/// and `authData` into one `_auth_data_<provider>` key per provider.
pub fn encode_object(schema: &ClassSchema, object: Object) -> Result<Document> {
    let object = expand_dot_fields(object);
    validate_keys(&Value::Object(object.clone()))?;

    let mut document = Document::new();

    for (field, value) in object {
        match (field.as_str(), value) {
            ("ACL", Value::Object(acl)) => {
                let (read, write) = split_acl(&acl);
                document.insert("_rperm", value::interior(&Value::Array(read))?);
                document.insert("_wperm", value::interior(&Value::Array(write))?);
            }
            ("authData", Value::Object(providers)) => {
                for (provider, data) in providers {
                    if !data.is_null() {
                        document.insert(
                            format!("{AUTH_DATA_PREFIX}{provider}"),
                            value::interior(&data)?,
                        );
                    }
                }
            }
            (_, Value::Null) => {}
            (field, value) => {
                if let Some((key, value)) = set_value(schema, field, &value)? {
                    document.insert(key, value);
                }
            }
        }
    }

    Ok(document)
}

/// Decodes a stored document back into the JSON object model.
///
/// Timestamps come back as ISO strings, pointer markers as pointers and
/// stored geo values in their tagged forms. Every relation field of the
/// schema is filled in; `null` values are dropped.
pub fn decode_document(document: Document, schema: &ClassSchema) -> Object {
    let mut object = Object::new();
    let mut auth_data = Object::new();

    for (key, value) in document {
        if matches!(value, Bson::Null | Bson::Undefined) || key == "_acl" {
            continue;
        }

        match key.as_str() {
            "_id" | "_created_at" | "_updated_at" => {
                let value = match value {
                    Bson::DateTime(datetime) => Value::String(value::iso(datetime)),
                    Bson::ObjectId(oid) => Value::String(oid.to_hex()),
                    other => to_json(&other),
                };
                object.insert(public_key(&key).to_string(), value);
                continue;
            }
            _ => {}
        }

        if let Some(provider) = auth_data_provider(&key) {
            auth_data.insert(provider.to_string(), to_json(&value));
            continue;
        }

        if let Some(field) = key.strip_prefix(POINTER_PREFIX) {
            match decode_pointer(schema, field, &value) {
                Some(pointer) => {
                    object.insert(field.to_string(), pointer);
                }
                None => tracing::debug!(field, "dropping unreadable pointer"),
            }
            continue;
        }

        let value = match (schema.field(&key), &value) {
            (Some(FieldType::File), Bson::String(name)) => {
                json!({"__type": "File", "name": name})
            }
            (Some(FieldType::GeoPoint), stored) => {
                geo_point_json(stored).unwrap_or_else(|| to_json(stored))
            }
            (Some(FieldType::Polygon), stored) => {
                polygon_json(stored).unwrap_or_else(|| to_json(stored))
            }
            (_, stored) => to_json(stored),
        };
        object.insert(key, value);
    }

    if !auth_data.is_empty() {
        object.insert("authData".to_string(), Value::Object(auth_data));
    }

    for (field, target) in schema.relation_fields() {
        object.insert(
            field.to_string(),
            json!({"__type": "Relation", "className": target}),
        );
    }

    object
}

/// A `Class$objectId` marker as a pointer. A bare id falls back to the
/// field's declared target class.
fn decode_pointer(schema: &ClassSchema, field: &str, value: &Bson) -> Option<Value> {
    let Bson::String(marker) = value else {
        return None;
    };
    pointer::marker_to_json(marker).or_else(|| match schema.field(field) {
        Some(FieldType::Pointer(target)) => Some(pointer::to_json(target, marker)),
        _ => None,
    })
}
