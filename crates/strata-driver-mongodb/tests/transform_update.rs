use bson::{doc, Bson, Document};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use strata_core::{schema::to_storage_schema, stmt::Update, ClassSchema, FieldType};
use strata_driver_mongodb::transform::transform_update;

fn schema() -> ClassSchema {
    to_storage_schema(
        &ClassSchema::new("Post")
            .with_field("title", FieldType::String)
            .with_field("age", FieldType::Number)
            .with_field("tags", FieldType::string_array())
            .with_field("scores", FieldType::Array(None))
            .with_field("author", FieldType::Pointer("_User".to_string()))
            .with_field("likes", FieldType::Relation("_User".to_string()))
            .with_field("publishedAt", FieldType::Date)
            .with_field("location", FieldType::GeoPoint)
            .with_field("meta", FieldType::Object),
    )
}

fn transform(update: Value) -> Document {
    transform_update(&schema(), &Update::from_json(&update).unwrap()).unwrap()
}

#[test]
fn operators_are_grouped() {
    assert_eq!(
        transform(json!({
            "title": "hello",
            "age": {"__op": "Increment", "amount": 2},
            "tags": {"__op": "AddUnique", "objects": ["a"]},
            "scores": {"__op": "Add", "objects": [1, 2]},
            "meta": {"__op": "Delete"},
            "labels": {"__op": "Remove", "objects": ["z"]},
        })),
        doc! {
            "$set": {"title": "hello"},
            "$unset": {"meta": ""},
            "$inc": {"age": 2},
            "$push": {"scores": {"$each": [1, 2]}},
            "$addToSet": {"tags": {"$each": ["a"]}},
            "$pullAll": {"labels": ["z"]},
        }
    );
}

#[test]
fn pointers_are_set_as_markers() {
    assert_eq!(
        transform(json!({
            "author": {"__type": "Pointer", "className": "_User", "objectId": "u1"}
        })),
        doc! {"$set": {"_p_author": "_User$u1"}}
    );
}

#[test]
fn undeclared_pointers_still_use_the_pointer_key() {
    assert_eq!(
        transform(json!({
            "editor": {"__type": "Pointer", "className": "_User", "objectId": "u2"}
        })),
        doc! {"$set": {"_p_editor": "_User$u2"}}
    );
}

#[test]
fn dates_accept_tagged_and_bare_forms() {
    let datetime = Bson::DateTime(bson::DateTime::from_millis(1_704_067_200_000));
    assert_eq!(
        transform(json!({
            "publishedAt": {"__type": "Date", "iso": "2024-01-01T00:00:00.000Z"},
            "updatedAt": "2024-01-01T00:00:00.000Z",
        })),
        doc! {"$set": {"publishedAt": datetime.clone(), "_updated_at": datetime}}
    );
}

#[test]
fn geo_points_are_longitude_first() {
    assert_eq!(
        transform(json!({
            "location": {"__type": "GeoPoint", "latitude": 10.5, "longitude": -20.25}
        })),
        doc! {"$set": {"location": [-20.25, 10.5]}}
    );
}

#[test]
fn dotted_paths_set_nested_values() {
    assert_eq!(
        transform(json!({"meta.kind": "draft"})),
        doc! {"$set": {"meta.kind": "draft"}}
    );
}

#[test]
fn relation_only_updates_store_nothing() {
    assert_eq!(
        transform(json!({
            "likes": {"__type": "Relation", "className": "_User"}
        })),
        doc! {}
    );
}

#[test]
fn acl_removal_unsets_both_arrays() {
    assert_eq!(
        transform(json!({"ACL": {"__op": "Delete"}})),
        doc! {"$unset": {"_rperm": "", "_wperm": ""}}
    );
}

#[test]
fn nested_keys_are_validated() {
    let err = transform_update(
        &schema(),
        &Update::from_json(&json!({"meta": {"a.b": 1}})).unwrap(),
    )
    .unwrap_err();
    assert!(err.is_invalid_nested_key());
}
