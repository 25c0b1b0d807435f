use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use strata_core::{stmt::Pipeline, ClassSchema, FieldType, Object};
use strata_sql::{compile_aggregate, Aggregate};

fn schema() -> ClassSchema {
    ClassSchema::new("Post")
        .with_field("title", FieldType::String)
        .with_field("age", FieldType::Number)
        .with_field("author", FieldType::Pointer("_User".to_string()))
}

fn compile(pipeline: Value) -> Aggregate {
    compile_aggregate("Post", &schema(), &Pipeline::from_json(&pipeline).unwrap()).unwrap()
}

fn sql(aggregate: &Aggregate) -> String {
    aggregate.statement.prepare().unwrap().0
}

fn params(aggregate: &Aggregate) -> Vec<Value> {
    aggregate.statement.prepare().unwrap().1
}

fn object(value: Value) -> Object {
    match value {
        Value::Object(object) => object,
        _ => panic!("expected object"),
    }
}

// ---------------------------------------------------------------------------
// $group
// ---------------------------------------------------------------------------

#[test]
fn group_by_field_with_count() {
    let aggregate = compile(json!([
        {"$group": {"_id": "$_p_author", "total": {"$sum": 1}}}
    ]));
    assert_eq!(
        aggregate.statement.pattern,
        "SELECT $2:name AS \"objectId\", COUNT(*) AS $3:name FROM $1:name GROUP BY $2:name"
    );
    assert_eq!(
        sql(&aggregate),
        "SELECT \"author\" AS \"objectId\", COUNT(*) AS \"total\" FROM \"Post\" GROUP BY \"author\""
    );
    assert_eq!(aggregate.count_field.as_deref(), Some("total"));
    assert!(aggregate.group_keys.is_empty());
}

#[test]
fn group_by_date_parts() {
    let aggregate = compile(json!([
        {"$group": {"_id": {"day": {"$dayOfMonth": "$_created_at"}, "author": "$author"}}}
    ]));
    assert_eq!(
        sql(&aggregate),
        "SELECT EXTRACT(DAY FROM \"createdAt\" AT TIME ZONE 'UTC')::integer AS \"day\", \
         \"author\" AS \"author\" FROM \"Post\" GROUP BY \"createdAt\", \"author\""
    );
    assert_eq!(aggregate.group_keys, vec!["day", "author"]);
}

#[test]
fn accumulators() {
    let aggregate = compile(json!([
        {"$group": {"_id": null, "high": {"$max": "$age"}, "sum": {"$sum": "$age"}}}
    ]));
    assert_eq!(
        sql(&aggregate),
        "SELECT MAX(\"age\") AS \"high\", SUM(\"age\") AS \"sum\" FROM \"Post\""
    );
    assert_eq!(aggregate.count_field, None);
}

#[test]
fn unknown_accumulator() {
    let pipeline = Pipeline::from_json(&json!([
        {"$group": {"_id": null, "all": {"$push": "$title"}}}
    ]))
    .unwrap();
    let err = compile_aggregate("Post", &schema(), &pipeline).unwrap_err();
    assert!(err.is_invalid_query());
}

// ---------------------------------------------------------------------------
// $match, $project, $sort, $limit, $skip
// ---------------------------------------------------------------------------

#[test]
fn match_sort_and_paging() {
    let aggregate = compile(json!([
        {"$match": {"age": {"$gt": 3}}},
        {"$sort": {"age": -1}},
        {"$limit": 5},
        {"$skip": 10},
    ]));
    assert_eq!(
        aggregate.statement.pattern,
        "SELECT * FROM $1:name WHERE ($5:name > $6) ORDER BY $2:name DESC LIMIT $3 OFFSET $4"
    );
    assert_eq!(
        sql(&aggregate),
        "SELECT * FROM \"Post\" WHERE (\"age\" > $1) ORDER BY \"age\" DESC LIMIT $2 OFFSET $3"
    );
    assert_eq!(params(&aggregate), vec![json!(3), json!(5), json!(10)]);
}

#[test]
fn match_stages_fold_by_key() {
    let aggregate = compile(json!([
        {"$match": {"$or": [{"title": "a"}, {"title": "b"}]}},
        {"$match": {"_id": "o1"}},
    ]));
    assert_eq!(
        sql(&aggregate),
        "SELECT * FROM \"Post\" WHERE \"title\" = $1 AND \"objectId\" = $2"
    );
    assert_eq!(params(&aggregate), vec![json!("b"), json!("o1")]);
}

#[test]
fn match_ignores_unknown_fields() {
    let aggregate = compile(json!([{"$match": {"missing": 1}}]));
    assert_eq!(sql(&aggregate), "SELECT * FROM \"Post\"");
}

#[test]
fn project_renames_pointer_columns() {
    let aggregate = compile(json!([
        {"$project": {"title": 1, "_p_author": true, "age": 0}}
    ]));
    assert_eq!(
        sql(&aggregate),
        "SELECT \"title\", \"author\" FROM \"Post\""
    );
}

#[test]
fn unsupported_stage() {
    let pipeline = Pipeline::from_json(&json!([{"$unwind": "$tags"}])).unwrap();
    let err = compile_aggregate("Post", &schema(), &pipeline).unwrap_err();
    assert!(err.is_invalid_query());
}

// ---------------------------------------------------------------------------
// Row reshaping
// ---------------------------------------------------------------------------

#[test]
fn reshape_group_keys_and_count() {
    let aggregate = compile(json!([
        {"$group": {
            "_id": {"day": {"$dayOfMonth": "$_created_at"}, "author": "$author"},
            "total": {"$sum": 1},
        }}
    ]));

    let row = aggregate.reshape(object(json!({"day": 3, "author": "x", "total": "7"})));
    assert_eq!(
        Value::Object(row),
        json!({"objectId": {"day": 3, "author": "x"}, "total": 7})
    );
}

#[test]
fn reshape_without_group_id() {
    let aggregate = compile(json!([{"$group": {"_id": null, "total": {"$sum": 1}}}]));
    let row = aggregate.reshape(object(json!({"total": "2"})));
    assert_eq!(Value::Object(row), json!({"objectId": null, "total": 2}));
}
