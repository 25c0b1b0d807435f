use bson::{doc, Binary, Bson, Document};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use strata_core::{schema::to_storage_schema, ClassSchema, FieldType, Object};
use strata_driver_mongodb::transform::{decode_document, encode_object};

fn schema() -> ClassSchema {
    to_storage_schema(
        &ClassSchema::new("Post")
            .with_field("title", FieldType::String)
            .with_field("author", FieldType::Pointer("_User".to_string()))
            .with_field("likes", FieldType::Relation("_User".to_string()))
            .with_field("publishedAt", FieldType::Date)
            .with_field("location", FieldType::GeoPoint)
            .with_field("area", FieldType::Polygon)
            .with_field("cover", FieldType::File)
            .with_field("data", FieldType::Bytes)
            .with_field("meta", FieldType::Object),
    )
}

fn object(value: Value) -> Object {
    match value {
        Value::Object(object) => object,
        _ => panic!("not an object"),
    }
}

fn encode(value: Value) -> Document {
    encode_object(&schema(), object(value)).unwrap()
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

#[test]
fn reserved_fields_and_pointers() {
    assert_eq!(
        encode(json!({
            "objectId": "p1",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "title": "hello",
            "author": {"__type": "Pointer", "className": "_User", "objectId": "u1"},
        })),
        doc! {
            "_id": "p1",
            "_created_at": Bson::DateTime(bson::DateTime::from_millis(1_704_067_200_000)),
            "title": "hello",
            "_p_author": "_User$u1",
        }
    );
}

#[test]
fn acl_and_auth_data() {
    assert_eq!(
        encode(json!({
            "ACL": {"*": {"read": true}, "u1": {"read": true, "write": true}},
            "authData": {"github": {"id": "7"}, "twitter": null},
        })),
        doc! {
            "_rperm": ["*", "u1"],
            "_wperm": ["u1"],
            "_auth_data_github": {"id": "7"},
        }
    );
}

#[test]
fn tagged_values() {
    assert_eq!(
        encode(json!({
            "cover": {"__type": "File", "name": "cover.png", "url": "http://files/cover.png"},
            "data": {"__type": "Bytes", "base64": "aGk="},
            "area": {"__type": "Polygon", "coordinates": [[0, 0], [0, 1], [1, 1]]},
            "likes": {"__type": "Relation", "className": "_User"},
            "title": null,
        })),
        doc! {
            "cover": "cover.png",
            "data": Bson::Binary(Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: b"hi".to_vec(),
            }),
            "area": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
            },
        }
    );
}

#[test]
fn dotted_keys_are_expanded() {
    assert_eq!(
        encode(json!({"meta.kind": "draft", "meta.rank": 2})),
        doc! {"meta": {"kind": "draft", "rank": 2}}
    );
}

#[test]
fn nested_keys_are_validated() {
    let err = encode_object(&schema(), object(json!({"meta": {"$where": 1}}))).unwrap_err();
    assert!(err.is_invalid_nested_key());
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[test]
fn decodes_stored_documents() {
    let document = doc! {
        "_id": "p1",
        "_created_at": Bson::DateTime(bson::DateTime::from_millis(1_704_067_200_000)),
        "title": "hello",
        "_p_author": "_User$u1",
        "location": [-20.25, 10.5],
        "cover": "cover.png",
        "publishedAt": Bson::DateTime(bson::DateTime::from_millis(1_704_067_200_000)),
        "_auth_data_github": {"id": "7"},
        "_rperm": ["*"],
        "meta": Bson::Null,
    };

    assert_eq!(
        Value::Object(decode_document(document, &schema())),
        json!({
            "objectId": "p1",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "title": "hello",
            "author": {"__type": "Pointer", "className": "_User", "objectId": "u1"},
            "location": {"__type": "GeoPoint", "latitude": 10.5, "longitude": -20.25},
            "cover": {"__type": "File", "name": "cover.png"},
            "publishedAt": {"__type": "Date", "iso": "2024-01-01T00:00:00.000Z"},
            "_rperm": ["*"],
            "authData": {"github": {"id": "7"}},
            "likes": {"__type": "Relation", "className": "_User"},
        })
    );
}

#[test]
fn decodes_polygons_back_to_latitude_first() {
    let document = doc! {
        "area": {
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
        },
    };

    let object = decode_document(document, &schema());
    assert_eq!(
        object["area"],
        json!({"__type": "Polygon", "coordinates": [[0, 0], [0, 1], [1, 1], [0, 0]]})
    );
}

#[test]
fn bare_pointer_ids_use_the_declared_target() {
    let object = decode_document(doc! {"_p_author": "u9"}, &schema());
    assert_eq!(
        object["author"],
        json!({"__type": "Pointer", "className": "_User", "objectId": "u9"})
    );
}
