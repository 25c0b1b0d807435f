use crate::{Error, Object, Result};

use serde_json::Value;

/// Rejects objects, at any depth, whose keys contain `$` or `.`.
pub fn validate_keys(value: &Value) -> Result<()> {
    match value {
        Value::Object(object) => {
            for (key, value) in object {
                if key.contains('$') || key.contains('.') {
                    return Err(Error::invalid_nested_key(
                        "Nested keys should not contain the '$' or '.' characters",
                    ));
                }
                validate_keys(value)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(validate_keys),
        _ => Ok(()),
    }
}

/// Rewrites dotted keys into nested objects: `{"a.b": 1}` becomes `{"a": {"b": 1}}`.
///
/// A dotted key whose value is a `Delete` operation is dropped.
pub fn expand_dot_fields(object: Object) -> Object {
    let mut expanded = Object::new();

    for (key, value) in object {
        if !key.contains('.') {
            expanded.insert(key, value);
            continue;
        }

        let is_delete = value.get("__op").and_then(Value::as_str) == Some("Delete");
        let mut components = key.split('.');
        let Some(first) = components.next() else {
            continue;
        };
        let rest: Vec<&str> = components.collect();

        let mut current = expanded
            .entry(first.to_string())
            .or_insert_with(|| Value::Object(Object::new()));

        for (i, component) in rest.iter().enumerate() {
            if !current.is_object() {
                *current = Value::Object(Object::new());
            }
            let Value::Object(map) = current else {
                break;
            };

            if i + 1 == rest.len() {
                if is_delete {
                    map.remove(*component);
                } else {
                    map.insert(component.to_string(), value.clone());
                }
                break;
            }

            current = map
                .entry(component.to_string())
                .or_insert_with(|| Value::Object(Object::new()));
        }
    }

    expanded
}
