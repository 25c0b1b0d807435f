use bson::{doc, Bson};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use strata_core::{stmt::Pipeline, ClassSchema, FieldType};
use strata_driver_mongodb::transform::{transform_pipeline, Aggregation};

fn schema() -> ClassSchema {
    ClassSchema::new("Post")
        .with_field("title", FieldType::String)
        .with_field("age", FieldType::Number)
        .with_field("tags", FieldType::string_array())
        .with_field("author", FieldType::Pointer("_User".to_string()))
        .with_field("publishedAt", FieldType::Date)
}

fn transform(pipeline: Value) -> Aggregation {
    transform_pipeline(&schema(), &Pipeline::from_json(&pipeline).unwrap()).unwrap()
}

#[test]
fn group_by_pointer() {
    let aggregation = transform(json!([
        {"$match": {"author": "u1", "createdAt": {"$gt": "2024-01-01T00:00:00.000Z"}}},
        {"$group": {"objectId": "$author", "total": {"$sum": "$age"}}},
        {"$sort": {"total": -1}},
        {"$limit": 5},
    ]));

    assert_eq!(
        aggregation.stages,
        vec![
            doc! {"$match": {
                "_p_author": "_User$u1",
                "_created_at": {"$gt": Bson::DateTime(bson::DateTime::from_millis(1_704_067_200_000))},
            }},
            doc! {"$group": {"_id": "$_p_author", "total": {"$sum": "$age"}}},
            doc! {"$sort": {"total": -1}},
            doc! {"$limit": 5_i64},
        ]
    );

    let result = aggregation.decode(doc! {"_id": "_User$u1", "total": 3}, &schema());
    assert_eq!(Value::Object(result), json!({"objectId": "u1", "total": 3}));
}

#[test]
fn group_without_key_reads_as_null() {
    let aggregation = transform(json!([{"$group": {"_id": null, "count": {"$sum": 1}}}]));
    assert_eq!(
        aggregation.stages,
        vec![doc! {"$group": {"_id": Bson::Null, "count": {"$sum": 1}}}]
    );

    let result = aggregation.decode(doc! {"_id": Bson::Null, "count": 4}, &schema());
    assert_eq!(Value::Object(result), json!({"objectId": null, "count": 4}));
}

#[test]
fn group_by_timestamp() {
    let aggregation = transform(json!([
        {"$group": {"_id": {"day": {"$dayOfMonth": "$createdAt"}}, "n": {"$sum": 1}}}
    ]));
    assert_eq!(
        aggregation.stages,
        vec![doc! {"$group": {
            "_id": {"day": {"$dayOfMonth": "$_created_at"}},
            "n": {"$sum": 1},
        }}]
    );
}

#[test]
fn match_keeps_existing_markers_and_nested_filters() {
    let aggregation = transform(json!([
        {"$match": {"$or": [{"author": "_User$u2"}, {"title": "x"}]}}
    ]));
    assert_eq!(
        aggregation.stages,
        vec![doc! {"$match": {"$or": [{"_p_author": "_User$u2"}, {"title": "x"}]}}]
    );
}

#[test]
fn project_and_other_stages() {
    let aggregation = transform(json!([
        {"$project": {"title": 1, "author": 1}},
        {"$unwind": "$tags"},
        {"$skip": 10},
    ]));
    assert_eq!(
        aggregation.stages,
        vec![
            doc! {"$project": {"title": 1, "_p_author": 1}},
            doc! {"$unwind": "$tags"},
            doc! {"$skip": 10_i64},
        ]
    );
}

#[test]
fn results_decode_like_objects() {
    let aggregation = transform(json!([{"$match": {"title": "x"}}]));
    let result = aggregation.decode(
        doc! {
            "_id": "p1",
            "_p_author": "_User$u1",
            "publishedAt": Bson::DateTime(bson::DateTime::from_millis(1_704_067_200_000)),
        },
        &schema(),
    );
    assert_eq!(
        Value::Object(result),
        json!({
            "objectId": "p1",
            "author": {"__type": "Pointer", "className": "_User", "objectId": "u1"},
            "publishedAt": {"__type": "Date", "iso": "2024-01-01T00:00:00.000Z"},
        })
    );
}
