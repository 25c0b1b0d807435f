mod aggregate;
pub use aggregate::{compile_aggregate, Aggregate};

mod insert;
pub use insert::compile_insert;

mod update;
pub use update::{compile_update, Assignments};

mod where_clause;
pub use where_clause::{compile_where, Where};

use serde_json::{json, Value};
use strata_core::{
    stmt::{pointer, Atom, GeoPoint, Polygon},
    Error, Result,
};

/// Earth radius used to turn radians into meters.
const EARTH_RADIUS_METERS: f64 = 6371.0 * 1000.0;

/// The value a typed atom is stored as in a scalar column.
fn column_value(value: &Value) -> Result<Value> {
    Ok(match Atom::classify(value)? {
        Atom::Pointer {
            class_name,
            object_id,
        } => Value::String(pointer::encode(class_name, object_id)),
        Atom::Date(iso) => Value::String(iso.to_string()),
        Atom::File { name } => Value::String(name.to_string()),
        Atom::Bytes(_) | Atom::Polygon(_) | Atom::GeoPoint(_) | Atom::Relation { .. } => {
            Value::String(value.to_string())
        }
        Atom::Null => Value::Null,
        Atom::Plain(Value::Object(_) | Value::Array(_)) => Value::String(value.to_string()),
        Atom::Plain(value) => value.clone(),
    })
}

/// A JSON document bound as text, for `::jsonb` casts.
fn json_text(value: &Value) -> Value {
    Value::String(value.to_string())
}

/// `(lng, lat)`, the native point literal.
fn point_literal(point: &GeoPoint) -> String {
    format!("({}, {})", point.longitude, point.latitude)
}

/// `((lng, lat), ..)`, the native polygon literal.
fn polygon_literal(points: &[GeoPoint]) -> String {
    let points: Vec<_> = points.iter().map(point_literal).collect();
    format!("({})", points.join(", "))
}

fn polygon_value(polygon: &Polygon) -> Value {
    Value::String(polygon_literal(&polygon.ring))
}

fn radians_to_meters(radians: f64) -> Value {
    json!(radians * EARTH_RADIUS_METERS)
}

/// Matches `_auth_data_<provider>` keys and returns the provider.
fn auth_data_provider(key: &str) -> Option<&str> {
    key.strip_prefix("_auth_data_").filter(|provider| {
        !provider.is_empty()
            && provider
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    })
}

fn forbidden_query(detail: impl std::fmt::Display) -> Error {
    Error::operation_forbidden(format!(
        "Postgres doesn't support this query type yet {detail}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_data_keys() {
        assert_eq!(auth_data_provider("_auth_data_facebook"), Some("facebook"));
        assert_eq!(auth_data_provider("_auth_data_"), None);
        assert_eq!(auth_data_provider("authData"), None);
    }

    #[test]
    fn typed_column_values() {
        let pointer = json!({"__type": "Pointer", "className": "_User", "objectId": "u1"});
        assert_eq!(column_value(&pointer).unwrap(), json!("_User$u1"));

        let date = json!({"__type": "Date", "iso": "2024-05-01T00:00:00.000Z"});
        assert_eq!(column_value(&date).unwrap(), json!("2024-05-01T00:00:00.000Z"));

        assert_eq!(column_value(&json!(3)).unwrap(), json!(3));
    }
}
