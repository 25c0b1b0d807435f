use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use strata_core::{stmt::Update, ClassSchema, FieldType};
use strata_sql::{compile_update, Assignments};

fn schema() -> ClassSchema {
    ClassSchema::new("Post")
        .with_field("title", FieldType::String)
        .with_field("age", FieldType::Number)
        .with_field("published", FieldType::Boolean)
        .with_field("tags", FieldType::string_array())
        .with_field("scores", FieldType::Array(None))
        .with_field("location", FieldType::GeoPoint)
        .with_field("author", FieldType::Pointer("_User".to_string()))
        .with_field("likes", FieldType::Relation("_User".to_string()))
        .with_field("meta", FieldType::Object)
        .with_field("authData", FieldType::Object)
}

fn compile(update: Value) -> Assignments {
    compile_update(&schema(), &Update::from_json(&update).unwrap(), 2).unwrap()
}

fn compile_err(update: Value) -> strata_core::Error {
    compile_update(&schema(), &Update::from_json(&update).unwrap(), 2).unwrap_err()
}

// ---------------------------------------------------------------------------
// Scalar operations
// ---------------------------------------------------------------------------

#[test]
fn increment() {
    let compiled = compile(json!({"age": {"__op": "Increment", "amount": 1}}));
    assert_eq!(compiled.pattern, "$2:name = COALESCE($2:name, 0) + $3");
    assert_eq!(compiled.values, vec![json!("age"), json!(1)]);
}

#[test]
fn delete_and_null() {
    assert_eq!(
        compile(json!({"title": {"__op": "Delete"}})).pattern,
        "$2:name = NULL"
    );
    assert_eq!(compile(json!({"title": null})).pattern, "$2:name = NULL");
}

#[test]
fn several_assignments() {
    let compiled = compile(json!({"title": "x", "published": true}));
    assert_eq!(compiled.pattern, "$2:name = $3, $4:name = $5");
    assert_eq!(
        compiled.values,
        vec![json!("title"), json!("x"), json!("published"), json!(true)]
    );
}

// ---------------------------------------------------------------------------
// Arrays
// ---------------------------------------------------------------------------

#[test]
fn add_unique_to_json_array() {
    let compiled = compile(json!({"scores": {"__op": "AddUnique", "objects": [1]}}));
    assert_eq!(
        compiled.pattern,
        "$2:name = array_add_unique(COALESCE($2:name, '[]'::jsonb), $3::jsonb)"
    );
    assert_eq!(compiled.values, vec![json!("scores"), json!("[1]")]);
}

#[test]
fn remove_from_json_array() {
    let compiled = compile(json!({"scores": {"__op": "Remove", "objects": [1, 2]}}));
    assert_eq!(
        compiled.pattern,
        "$2:name = array_remove(COALESCE($2:name, '[]'::jsonb), $3::jsonb)"
    );
}

#[test]
fn add_to_string_array() {
    let compiled = compile(json!({"tags": {"__op": "Add", "objects": ["a"]}}));
    assert_eq!(
        compiled.pattern,
        "$2:name = array_cat(COALESCE($2:name, '{}'::text[]), $3::text[])"
    );
    assert_eq!(compiled.values, vec![json!("tags"), json!(["a"])]);
}

#[test]
fn remove_from_string_array() {
    let compiled = compile(json!({"tags": {"__op": "Remove", "objects": ["a"]}}));
    assert_eq!(
        compiled.pattern,
        "$2:name = ARRAY(SELECT e FROM unnest(COALESCE($2:name, '{}'::text[])) e WHERE e <> ALL($3::text[]))"
    );
}

#[test]
fn set_string_array() {
    let compiled = compile(json!({"tags": ["a", "b"]}));
    assert_eq!(compiled.pattern, "$2:name = $3::text[]");
}

// ---------------------------------------------------------------------------
// Typed values
// ---------------------------------------------------------------------------

#[test]
fn set_pointer() {
    let compiled = compile(json!({
        "author": {"__type": "Pointer", "className": "_User", "objectId": "u1"}
    }));
    assert_eq!(compiled.pattern, "$2:name = $3");
    assert_eq!(compiled.values, vec![json!("author"), json!("_User$u1")]);
}

#[test]
fn set_geo_point() {
    let compiled = compile(json!({
        "location": {"__type": "GeoPoint", "latitude": 1.5, "longitude": 2.5}
    }));
    assert_eq!(compiled.pattern, "$2:name = POINT($3, $4)");
    assert_eq!(
        compiled.values,
        vec![json!("location"), json!(2.5), json!(1.5)]
    );
}

#[test]
fn set_relation_is_noop() {
    let compiled = compile(json!({"likes": {"__type": "Relation", "className": "_User"}}));
    assert!(compiled.is_empty());
    assert!(compiled.values.is_empty());
}

#[test]
fn object_on_scalar_field_is_forbidden() {
    let err = compile_err(json!({"title": {"a": 1}}));
    assert!(err.is_operation_forbidden());
}

// ---------------------------------------------------------------------------
// Nested object updates
// ---------------------------------------------------------------------------

#[test]
fn dotted_updates_merge_into_one_assignment() {
    let compiled = compile(json!({
        "meta.count": {"__op": "Increment", "amount": 2},
        "meta.kind": "draft",
        "meta.old": {"__op": "Delete"},
    }));
    assert_eq!(
        compiled.pattern,
        "$2:name = (COALESCE($2:name, '{}'::jsonb) \
         || jsonb_build_object($3::text, COALESCE(($2:name->>$3::text)::numeric, 0) + $4) \
         #- $5::text[] || $6::jsonb)"
    );
    assert_eq!(
        compiled.values,
        vec![
            json!("meta"),
            json!("count"),
            json!(2),
            json!(["old"]),
            json!("{\"kind\":\"draft\"}"),
        ]
    );
}

#[test]
fn dotted_update_on_scalar_is_forbidden() {
    let err = compile_err(json!({"title.x": 1}));
    assert!(err.is_operation_forbidden());
}

#[test]
fn deep_increment_is_forbidden() {
    let err = compile_err(json!({"meta.a.b": {"__op": "Increment", "amount": 1}}));
    assert!(err.is_operation_forbidden());
}

// ---------------------------------------------------------------------------
// Auth data
// ---------------------------------------------------------------------------

#[test]
fn auth_data_provider_set() {
    let compiled = compile(json!({"_auth_data_facebook": {"id": "1"}}));
    assert_eq!(
        compiled.pattern,
        "$2:name = json_object_set_key(COALESCE($2:name, '{}'::jsonb), $3::text, $4::jsonb)::jsonb"
    );
    assert_eq!(
        compiled.values,
        vec![json!("authData"), json!("facebook"), json!("{\"id\":\"1\"}")]
    );
}

#[test]
fn auth_data_providers_fold_into_one_chain() {
    let compiled = compile(json!({
        "_auth_data_facebook": {"__op": "Delete"},
        "authData": {"github": {"id": "2"}},
        "title": "x",
    }));
    assert_eq!(
        compiled.pattern,
        "$2:name = json_object_set_key(COALESCE((COALESCE($2:name, '{}'::jsonb) - $3::text), '{}'::jsonb), $4::text, $5::jsonb)::jsonb, $6:name = $7"
    );
}
