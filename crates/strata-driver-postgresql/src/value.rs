use crate::error::map_error;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use postgres_types::{private::BytesMut, to_sql_checked, Format, FromSql, IsNull, Kind, ToSql, Type};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde_json::{json, Value};
use strata_core::{err, stmt::pointer, ClassSchema, FieldType, Object, Result};
use strata_sql::Statement;
use tokio_postgres::Row;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// A native `point`, `(x, y)` = `(longitude, latitude)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Point {
    pub(crate) x: f64,
    pub(crate) y: f64,
}

/// A native `polygon`, as its vertices.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Polygon(pub(crate) Vec<Point>);

/// A value bound to a statement parameter.
///
/// Parameters go over the wire in text format, so the server parses each one
/// as the type the statement gives it, the same way it reads a quoted literal.
#[derive(Debug)]
pub(crate) struct Param(pub(crate) Value);

impl ToSql for Param {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        if self.0.is_null() {
            return Ok(IsNull::Yes);
        }
        out.extend_from_slice(param_text(&self.0, ty).as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    fn encode_format(&self, _: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// The text form of a parameter of type `ty`. Arrays bound to array types
/// use the array literal syntax; other structured values are JSON.
fn param_text(value: &Value, ty: &Type) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) if matches!(ty.kind(), Kind::Array(_)) => array_literal(items),
        value => value.to_string(),
    }
}

/// `{"a","b"}`, with every element quoted.
fn array_literal(items: &[Value]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Null => "NULL".to_string(),
            Value::Array(items) => array_literal(items),
            Value::String(text) => quote_element(text),
            item => quote_element(&item.to_string()),
        })
        .collect();
    format!("{{{}}}", elements.join(","))
}

fn quote_element(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Renders `statement` for execution, wrapping each bound value.
pub(crate) fn prepare(statement: &Statement) -> Result<(String, Vec<Param>)> {
    let (sql, values) = statement.prepare()?;
    Ok((sql, values.into_iter().map(Param).collect()))
}

/// Borrows parameters the way the client's query methods take them.
pub(crate) fn args(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|param| param as &(dyn ToSql + Sync))
        .collect()
}

fn read_f64(raw: &[u8], offset: usize) -> std::result::Result<f64, BoxError> {
    raw.get(offset..offset + 8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(f64::from_be_bytes)
        .ok_or_else(|| "truncated geometric value".into())
}

impl<'a> FromSql<'a> for Point {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Point, BoxError> {
        Ok(Point {
            x: read_f64(raw, 0)?,
            y: read_f64(raw, 8)?,
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::POINT
    }
}

impl<'a> FromSql<'a> for Polygon {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Polygon, BoxError> {
        let count = raw
            .get(0..4)
            .and_then(|bytes| bytes.try_into().ok())
            .map(i32::from_be_bytes)
            .ok_or("truncated polygon")?;

        let mut points = Vec::with_capacity(count.max(0) as usize);
        for i in 0..count.max(0) as usize {
            let offset = 4 + i * 16;
            points.push(Point {
                x: read_f64(raw, offset)?,
                y: read_f64(raw, offset + 8)?,
            });
        }
        Ok(Polygon(points))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::POLYGON
    }
}

/// A `numeric` as the nearest JSON number.
fn decimal_number(value: Decimal) -> Value {
    value.to_f64().map(number).unwrap_or(Value::Null)
}

/// `{"__type": "Date", "iso": ..}` with millisecond precision.
pub(crate) fn date_json(date: DateTime<Utc>) -> Value {
    json!({
        "__type": "Date",
        "iso": date.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// Integral doubles read back as integers.
pub(crate) fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, index: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(index).map_err(map_error)
}

/// Converts one column of a row to JSON, by its native type.
fn column_to_json(row: &Row, index: usize, ty: &Type) -> Result<Value> {
    let value = if ty == &Type::TEXT || ty == &Type::VARCHAR || ty == &Type::BPCHAR || ty == &Type::NAME {
        get::<String>(row, index)?.map(Value::String)
    } else if ty == &Type::BOOL {
        get::<bool>(row, index)?.map(Value::Bool)
    } else if ty == &Type::INT2 {
        get::<i16>(row, index)?.map(Value::from)
    } else if ty == &Type::INT4 {
        get::<i32>(row, index)?.map(Value::from)
    } else if ty == &Type::INT8 {
        get::<i64>(row, index)?.map(Value::from)
    } else if ty == &Type::FLOAT4 {
        get::<f32>(row, index)?.map(|n| number(f64::from(n)))
    } else if ty == &Type::FLOAT8 {
        get::<f64>(row, index)?.map(number)
    } else if ty == &Type::NUMERIC {
        get::<Decimal>(row, index)?.map(decimal_number)
    } else if ty == &Type::JSON || ty == &Type::JSONB {
        get::<Value>(row, index)?
    } else if ty == &Type::TIMESTAMPTZ {
        get::<DateTime<Utc>>(row, index)?.map(date_json)
    } else if ty == &Type::TIMESTAMP {
        get::<NaiveDateTime>(row, index)?.map(|date| date_json(date.and_utc()))
    } else if ty == &Type::TEXT_ARRAY || ty == &Type::VARCHAR_ARRAY {
        get::<Vec<Option<String>>>(row, index)?
            .map(|items| Value::Array(items.into_iter().map(|item| json!(item)).collect()))
    } else if ty == &Type::POINT {
        get::<Point>(row, index)?.map(|point| {
            json!({"__type": "GeoPoint", "latitude": point.y, "longitude": point.x})
        })
    } else if ty == &Type::POLYGON {
        get::<Polygon>(row, index)?.map(|polygon| {
            let coordinates: Vec<Value> = polygon.0.iter().map(|point| json!([point.y, point.x])).collect();
            json!({"__type": "Polygon", "coordinates": coordinates})
        })
    } else {
        return Err(err!("unsupported column type `{ty}` at index {index}"));
    };

    Ok(value.unwrap_or(Value::Null))
}

/// A row as a JSON object keyed by column name.
pub(crate) fn row_to_object(row: &Row) -> Result<Object> {
    let mut object = Object::new();
    for (index, column) in row.columns().iter().enumerate() {
        object.insert(
            column.name().to_string(),
            column_to_json(row, index, column.type_())?,
        );
    }
    Ok(object)
}

/// Turns stored columns back into the JSON object model: pointer markers
/// into pointers, file names into files, relation fields filled in, `createdAt`
/// and `updatedAt` as plain ISO strings, and `NULL` columns dropped.
pub(crate) fn decode_object(mut object: Object, schema: &ClassSchema) -> Object {
    for (name, ty) in &schema.fields {
        let decoded = match (ty, object.get(name)) {
            (FieldType::Pointer(target), Some(Value::String(marker))) => Some(
                pointer::marker_to_json(marker).unwrap_or_else(|| pointer::to_json(target, marker)),
            ),
            (FieldType::Relation(target), _) => {
                Some(json!({"__type": "Relation", "className": target}))
            }
            (FieldType::File, Some(Value::String(file))) => {
                Some(json!({"__type": "File", "name": file}))
            }
            _ => None,
        };

        if let Some(value) = decoded {
            object.insert(name.clone(), value);
        }
    }

    for field in ["createdAt", "updatedAt"] {
        let iso = object
            .get(field)
            .and_then(|date| date.get("iso"))
            .cloned();
        if let Some(iso) = iso {
            object.insert(field.to_string(), iso);
        }
    }

    object.retain(|_, value| !value.is_null());
    object
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values() {
        // 12.5: two base-10000 digits, weight 0, scale 1.
        let raw = [0, 2, 0, 0, 0, 0, 0, 1, 0, 12, 0x13, 0x88];
        let value = Decimal::from_sql(&Type::NUMERIC, &raw).unwrap();
        assert_eq!(decimal_number(value), json!(12.5));
        assert_eq!(decimal_number(Decimal::new(-3, 0)), json!(-3));

        for sign in [0xD0, 0xF0, 0xC0] {
            let raw = [0, 0, 0, 0, sign, 0, 0, 0];
            assert!(Decimal::from_sql(&Type::NUMERIC, &raw).is_err());
        }
    }

    #[test]
    fn params_use_text_format() {
        let param = Param(json!("it's"));
        assert!(matches!(param.encode_format(&Type::TEXT), Format::Text));
        assert!(<Param as ToSql>::accepts(&Type::POLYGON));

        let mut out = BytesMut::new();
        assert!(matches!(param.to_sql(&Type::TEXT, &mut out), Ok(IsNull::No)));
        assert_eq!(&out[..], b"it's");

        let mut out = BytesMut::new();
        assert!(matches!(
            Param(Value::Null).to_sql(&Type::TEXT, &mut out),
            Ok(IsNull::Yes)
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn param_text_by_type() {
        assert_eq!(param_text(&json!("x\\' OR 1=1 --"), &Type::TEXT), "x\\' OR 1=1 --");
        assert_eq!(param_text(&json!(3), &Type::FLOAT8), "3");
        assert_eq!(param_text(&json!(true), &Type::BOOL), "true");
        assert_eq!(param_text(&json!({"a": [1]}), &Type::JSONB), "{\"a\":[1]}");
        assert_eq!(param_text(&json!(["a", "b"]), &Type::JSONB), "[\"a\",\"b\"]");
        assert_eq!(
            param_text(&json!(["a", "b\"c", "d\\e", null]), &Type::TEXT_ARRAY),
            "{\"a\",\"b\\\"c\",\"d\\\\e\",NULL}"
        );
        assert_eq!(param_text(&json!([]), &Type::TEXT_ARRAY), "{}");
    }

    #[test]
    fn geometric_values() {
        let mut raw = vec![];
        raw.extend(2.5f64.to_be_bytes());
        raw.extend((-1.0f64).to_be_bytes());
        assert_eq!(
            Point::from_sql(&Type::POINT, &raw).unwrap(),
            Point { x: 2.5, y: -1.0 }
        );

        let mut polygon = 2i32.to_be_bytes().to_vec();
        polygon.extend(&raw);
        polygon.extend(&raw);
        assert_eq!(Polygon::from_sql(&Type::POLYGON, &polygon).unwrap().0.len(), 2);

        assert!(Point::from_sql(&Type::POINT, &raw[..10]).is_err());
    }

    #[test]
    fn numbers() {
        assert_eq!(number(3.0), json!(3));
        assert_eq!(number(2.5), json!(2.5));
        assert_eq!(number(f64::NAN), Value::Null);
    }

    #[test]
    fn dates_keep_milliseconds() {
        let date = DateTime::parse_from_rfc3339("2024-05-01T10:20:30.123Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            date_json(date),
            json!({"__type": "Date", "iso": "2024-05-01T10:20:30.123Z"})
        );
    }

    #[test]
    fn decode_stored_columns() {
        let schema = ClassSchema::new("Post")
            .with_field("author", FieldType::Pointer("_User".to_string()))
            .with_field("likes", FieldType::Relation("_User".to_string()))
            .with_field("image", FieldType::File)
            .with_field("title", FieldType::String);

        let Value::Object(stored) = json!({
            "objectId": "p1",
            "createdAt": {"__type": "Date", "iso": "2024-01-01T00:00:00.000Z"},
            "author": "_User$u1",
            "image": "pic.png",
            "title": null,
        }) else {
            unreachable!()
        };

        assert_eq!(
            Value::Object(decode_object(stored, &schema)),
            json!({
                "objectId": "p1",
                "createdAt": "2024-01-01T00:00:00.000Z",
                "author": {"__type": "Pointer", "className": "_User", "objectId": "u1"},
                "image": {"__type": "File", "name": "pic.png"},
                "likes": {"__type": "Relation", "className": "_User"},
            })
        );
    }

    #[test]
    fn legacy_pointer_ids() {
        let schema =
            ClassSchema::new("Post").with_field("author", FieldType::Pointer("_User".to_string()));
        let Value::Object(stored) = json!({"author": "u1"}) else {
            unreachable!()
        };
        assert_eq!(
            decode_object(stored, &schema)["author"],
            json!({"__type": "Pointer", "className": "_User", "objectId": "u1"})
        );
    }
}
