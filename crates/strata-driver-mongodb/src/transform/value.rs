use base64::{engine::general_purpose::STANDARD, Engine as _};
use bson::{doc, spec::BinarySubtype, Binary, Bson, Document};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Number, Value};
use strata_core::{
    stmt::{pointer, Atom, GeoPoint, Polygon},
    Error, Object, Result,
};

/// A value as stored at the top level of a document.
///
/// Pointers collapse to their `Class$objectId` marker, geo values to their
/// GeoJSON forms and files to their name. Relations are never stored and
/// yield `None`.
pub fn top_level(value: &Value) -> Result<Option<Bson>> {
    Ok(Some(match Atom::classify(value)? {
        Atom::Null => Bson::Null,
        Atom::Pointer {
            class_name,
            object_id,
        } => Bson::String(pointer::encode(class_name, object_id)),
        Atom::Date(iso) => date(iso)?,
        Atom::GeoPoint(point) => geo_point(&point),
        Atom::Polygon(polygon) => geo_polygon(&polygon),
        Atom::File { name } => Bson::String(name.to_string()),
        Atom::Bytes(base64) => bytes(base64)?,
        Atom::Relation { .. } => return Ok(None),
        Atom::Plain(value) => interior(value)?,
    }))
}

/// A value nested inside an object or array. Dates and bytes take their
/// native types; other tagged values keep their JSON shape.
pub fn interior(value: &Value) -> Result<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => number(n),
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(interior).collect::<Result<_>>()?),
        Value::Object(object) => match Atom::classify_lenient(value) {
            Atom::Date(iso) => date(iso)?,
            Atom::Bytes(base64) => bytes(base64)?,
            _ => Bson::Document(interior_document(object)?),
        },
    })
}

pub fn interior_document(object: &Object) -> Result<Document> {
    let mut document = Document::new();
    for (key, value) in object {
        document.insert(key.clone(), interior(value)?);
    }
    Ok(document)
}

/// JSON numbers take the narrowest integer type that holds them.
pub fn number(n: &Number) -> Bson {
    match n.as_i64() {
        Some(i) => match i32::try_from(i) {
            Ok(i) => Bson::Int32(i),
            Err(_) => Bson::Int64(i),
        },
        None => Bson::Double(n.as_f64().unwrap_or_default()),
    }
}

pub fn date(iso: &str) -> Result<Bson> {
    let parsed = chrono::DateTime::parse_from_rfc3339(iso)
        .map_err(|_| Error::invalid_json(format!("invalid Date: {iso}")))?;
    Ok(Bson::DateTime(bson::DateTime::from_chrono(
        parsed.with_timezone(&Utc),
    )))
}

pub fn bytes(base64: &str) -> Result<Bson> {
    let bytes = STANDARD
        .decode(base64)
        .map_err(|_| Error::invalid_json(format!("invalid Bytes: {base64}")))?;
    Ok(Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    }))
}

/// `[longitude, latitude]`
pub fn geo_point(point: &GeoPoint) -> Bson {
    Bson::Array(vec![
        Bson::Double(point.longitude),
        Bson::Double(point.latitude),
    ])
}

/// A GeoJSON polygon with a single closed `[longitude, latitude]` ring.
pub fn geo_polygon(polygon: &Polygon) -> Bson {
    let ring: Vec<Bson> = polygon.ring.iter().map(geo_point).collect();
    Bson::Document(doc! {
        "type": "Polygon",
        "coordinates": [ring],
    })
}

pub fn iso(datetime: bson::DateTime) -> String {
    datetime
        .to_chrono()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn date_json(datetime: bson::DateTime) -> Value {
    json!({"__type": "Date", "iso": iso(datetime)})
}

pub fn bytes_json(binary: &Binary) -> Value {
    json!({"__type": "Bytes", "base64": STANDARD.encode(&binary.bytes)})
}

/// Decodes a nested value. Dates and binaries come back tagged.
pub fn to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => float(*f),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        Bson::Document(document) => Value::Object(document_to_json(document)),
        Bson::DateTime(datetime) => date_json(*datetime),
        Bson::Binary(binary) => bytes_json(binary),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::RegularExpression(regex) => {
            json!({"$regex": regex.pattern, "$options": regex.options})
        }
        other => other.clone().into_relaxed_extjson(),
    }
}

pub fn document_to_json(document: &Document) -> Object {
    document
        .iter()
        .map(|(key, value)| (key.clone(), to_json(value)))
        .collect()
}

/// Integral doubles read back as integers.
fn float(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// `[longitude, latitude]` back to a GeoPoint.
pub fn geo_point_json(value: &Bson) -> Option<Value> {
    let Bson::Array(pair) = value else {
        return None;
    };
    match pair.as_slice() {
        [longitude, latitude] => Some(json!({
            "__type": "GeoPoint",
            "latitude": float(as_f64(latitude)?),
            "longitude": float(as_f64(longitude)?),
        })),
        _ => None,
    }
}

/// A GeoJSON polygon back to `[latitude, longitude]` coordinates.
pub fn polygon_json(value: &Bson) -> Option<Value> {
    let Bson::Document(document) = value else {
        return None;
    };
    let ring = document.get_array("coordinates").ok()?.first()?;
    let Bson::Array(ring) = ring else {
        return None;
    };

    let coordinates = ring
        .iter()
        .map(|vertex| match vertex {
            Bson::Array(pair) => match pair.as_slice() {
                [longitude, latitude] => {
                    Some(json!([float(as_f64(latitude)?), float(as_f64(longitude)?)]))
                }
                _ => None,
            },
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    Some(json!({"__type": "Polygon", "coordinates": coordinates}))
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(f) => Some(*f),
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}
