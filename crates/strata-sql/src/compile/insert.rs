use super::{auth_data_provider, column_value, json_text, polygon_value};
use crate::{Emitter, Statement};

use serde_json::Value;
use strata_core::{
    schema::to_storage_schema,
    stmt::{expand_dot_fields, split_acl, validate_keys, Atom},
    ClassSchema, Error, FieldType, Object, Result,
};

enum Insert {
    Value(Value),
    Cast(Value, &'static str),
    Point(f64, f64),
}

/// Compiles an `INSERT` of `object` into the class table.
///
/// Dotted keys are expanded first, `_auth_data_<provider>` keys fold into
/// `authData` and an `ACL` splits into the permission arrays.
pub fn compile_insert(class_name: &str, schema: &ClassSchema, object: Object) -> Result<Statement> {
    let schema = to_storage_schema(schema);
    let object = expand_dot_fields(object);
    validate_keys(&Value::Object(object.clone()))?;

    let mut columns: Vec<(String, Insert)> = vec![];
    let mut auth_data = Object::new();

    for (field, value) in object {
        if let Some(provider) = auth_data_provider(&field) {
            auth_data.insert(provider.to_string(), value);
            continue;
        }

        if field == "ACL" {
            if let Value::Object(acl) = &value {
                let (read, write) = split_acl(acl);
                columns.push(("_rperm".to_string(), Insert::Cast(Value::Array(read), "text[]")));
                columns.push(("_wperm".to_string(), Insert::Cast(Value::Array(write), "text[]")));
            }
            continue;
        }

        if value.is_null() {
            continue;
        }

        let insert = match field.as_str() {
            "objectId" => Insert::Value(value),
            "createdAt" | "updatedAt" => Insert::Value(timestamp(&field, &value)?),
            "authData" => {
                if let Value::Object(providers) = value {
                    auth_data.extend(providers);
                }
                continue;
            }
            _ => {
                let Some(ty) = schema.field(&field) else {
                    return Err(Error::invalid_json(format!(
                        "field {field} is not defined on class {class_name}"
                    )));
                };
                let Some(insert) = typed_value(ty, &value)? else {
                    continue;
                };
                insert
            }
        };
        columns.push((field, insert));
    }

    if !auth_data.is_empty() {
        columns.push((
            "authData".to_string(),
            Insert::Cast(json_text(&Value::Object(auth_data)), "jsonb"),
        ));
    }

    let mut e = Emitter::new(2);
    let names: Vec<String> = columns.iter().map(|(name, _)| e.bind_name(name)).collect();
    let values: Vec<String> = columns
        .into_iter()
        .map(|(_, insert)| match insert {
            Insert::Value(value) => e.bind(value),
            Insert::Cast(value, ty) => format!("{}::{ty}", e.bind(value)),
            Insert::Point(lng, lat) => {
                let lng = e.bind(lng);
                let lat = e.bind(lat);
                format!("POINT({lng}, {lat})")
            }
        })
        .collect();

    let sql = format!(
        "INSERT INTO $1:name ({}) VALUES ({})",
        names.join(", "),
        values.join(", ")
    );

    let mut bound = vec![Value::String(class_name.to_string())];
    bound.extend(e.into_values());
    Ok(Statement::new(sql, bound))
}

fn timestamp(field: &str, value: &Value) -> Result<Value> {
    match Atom::classify(value)? {
        Atom::Date(iso) => Ok(Value::String(iso.to_string())),
        Atom::Plain(Value::String(iso)) => Ok(Value::String(iso.clone())),
        _ => Err(Error::invalid_json(format!("{field} must be a date"))),
    }
}

/// `None` for values stored outside the class table.
fn typed_value(ty: &FieldType, value: &Value) -> Result<Option<Insert>> {
    let insert = match (ty, Atom::classify(value)?) {
        (FieldType::Relation(_), _) | (_, Atom::Relation { .. }) => return Ok(None),
        (_, Atom::GeoPoint(point)) => Insert::Point(point.longitude, point.latitude),
        (_, Atom::Polygon(polygon)) => Insert::Cast(polygon_value(&polygon), "polygon"),
        (_, Atom::Pointer { .. } | Atom::Date(_) | Atom::File { .. }) => {
            Insert::Value(column_value(value)?)
        }
        (ty, Atom::Plain(Value::Array(_))) if ty.is_string_array() => {
            Insert::Cast(value.clone(), "text[]")
        }
        (FieldType::Array(_) | FieldType::Object | FieldType::Bytes, _) => {
            Insert::Cast(json_text(value), "jsonb")
        }
        (_, Atom::Bytes(_) | Atom::Plain(Value::Object(_) | Value::Array(_))) => {
            return Err(Error::invalid_json(format!(
                "{value} is not a valid {}",
                ty.name()
            )))
        }
        (_, _) => Insert::Value(value.clone()),
    };
    Ok(Some(insert))
}
