use super::{GeoPoint, Polygon};
use crate::{Error, Result};

use serde_json::Value;

/// A JSON value classified by its `__type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom<'a> {
    Null,
    Pointer {
        class_name: &'a str,
        object_id: &'a str,
    },
    /// ISO-8601 timestamp.
    Date(&'a str),
    GeoPoint(GeoPoint),
    Polygon(Polygon),
    File {
        name: &'a str,
    },
    /// Base64 payload.
    Bytes(&'a str),
    Relation {
        class_name: &'a str,
    },
    /// Any value without a recognized `__type` tag.
    Plain(&'a Value),
}

impl<'a> Atom<'a> {
    /// Classifies `value`. Tagged values with missing or malformed members
    /// are rejected.
    pub fn classify(value: &'a Value) -> Result<Atom<'a>> {
        let object = match value {
            Value::Null => return Ok(Atom::Null),
            Value::Object(object) => object,
            _ => return Ok(Atom::Plain(value)),
        };

        let Some(ty) = object.get("__type").and_then(Value::as_str) else {
            return Ok(Atom::Plain(value));
        };

        let member = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid_json(format!("invalid {ty}: missing {name}")))
        };

        Ok(match ty {
            "Pointer" => Atom::Pointer {
                class_name: member("className")?,
                object_id: member("objectId")?,
            },
            "Date" => Atom::Date(member("iso")?),
            "GeoPoint" => Atom::GeoPoint(GeoPoint::from_json(value)?),
            "Polygon" => Atom::Polygon(Polygon::from_json(value)?),
            "File" => Atom::File {
                name: member("name")?,
            },
            "Bytes" => Atom::Bytes(member("base64")?),
            "Relation" => Atom::Relation {
                class_name: member("className")?,
            },
            _ => Atom::Plain(value),
        })
    }

    /// Classifies without validating; malformed tagged values come back as `Plain`.
    pub fn classify_lenient(value: &'a Value) -> Atom<'a> {
        Atom::classify(value).unwrap_or(Atom::Plain(value))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Atom::Pointer { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_typed_values() {
        let pointer = json!({"__type": "Pointer", "className": "Post", "objectId": "p1"});
        assert_eq!(
            Atom::classify(&pointer).unwrap(),
            Atom::Pointer {
                class_name: "Post",
                object_id: "p1"
            }
        );

        let date = json!({"__type": "Date", "iso": "2024-01-01T00:00:00.000Z"});
        assert_eq!(
            Atom::classify(&date).unwrap(),
            Atom::Date("2024-01-01T00:00:00.000Z")
        );

        let plain = json!({"a": 1});
        assert_eq!(Atom::classify(&plain).unwrap(), Atom::Plain(&plain));
    }

    #[test]
    fn malformed_pointer() {
        let pointer = json!({"__type": "Pointer", "className": "Post"});
        assert!(Atom::classify(&pointer).unwrap_err().is_invalid_json());
    }
}
