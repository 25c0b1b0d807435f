use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use strata_core::{stmt::Query, ClassSchema, FieldType};
use strata_sql::{compile_where, placeholders, Where};

fn schema() -> ClassSchema {
    ClassSchema::new("Post")
        .with_field("title", FieldType::String)
        .with_field("age", FieldType::Number)
        .with_field("published", FieldType::Boolean)
        .with_field("tags", FieldType::string_array())
        .with_field("scores", FieldType::Array(None))
        .with_field("location", FieldType::GeoPoint)
        .with_field("author", FieldType::Pointer("_User".to_string()))
        .with_field("meta", FieldType::Object)
}

fn compile(query: Value) -> Where {
    compile_where(&schema(), &Query::from_json(&query).unwrap(), 2).unwrap()
}

fn compile_err(query: Value) -> strata_core::Error {
    compile_where(&schema(), &Query::from_json(&query).unwrap(), 2).unwrap_err()
}

/// Every placeholder from the start index up is bound exactly once.
fn assert_dense(compiled: &Where) {
    let expected: Vec<usize> = (2..2 + compiled.values.len()).collect();
    assert_eq!(
        placeholders(&compiled.pattern).into_iter().collect::<Vec<_>>(),
        expected
    );
}

// ---------------------------------------------------------------------------
// Equality and membership
// ---------------------------------------------------------------------------

#[test]
fn scalar_equality() {
    let compiled = compile(json!({"title": "hello"}));
    assert_eq!(compiled.pattern, "$2:name = $3");
    assert_eq!(compiled.values, vec![json!("title"), json!("hello")]);
}

#[test]
fn scalar_in() {
    let compiled = compile(json!({"age": {"$in": [1, 2, 3]}}));
    assert_eq!(compiled.pattern, "$2:name IN ($3,$4,$5)");
    assert_eq!(
        compiled.values,
        vec![json!("age"), json!(1), json!(2), json!(3)]
    );
    assert_dense(&compiled);
}

#[test]
fn in_with_null_matches_missing() {
    let compiled = compile(json!({"title": {"$in": ["a", null]}}));
    assert_eq!(compiled.pattern, "($2:name IS NULL OR $2:name IN ($3))");
}

#[test]
fn empty_in_and_nin() {
    assert_eq!(compile(json!({"title": {"$in": []}})).pattern, "$2:name IS NULL");
    assert_eq!(compile(json!({"title": {"$nin": []}})).pattern, "1 = 1");
}

#[test]
fn string_array_membership() {
    let compiled = compile(json!({"tags": "rust"}));
    assert_eq!(compiled.pattern, "$2:name && ARRAY[$3]");

    let compiled = compile(json!({"tags": {"$nin": ["a", "b"]}}));
    assert_eq!(
        compiled.pattern,
        "($2:name IS NULL OR NOT ($2:name && ARRAY[$3,$4]))"
    );
}

#[test]
fn json_array_membership() {
    let compiled = compile(json!({"scores": {"$in": [1, 2]}}));
    assert_eq!(compiled.pattern, "array_contains($2:name, $3::jsonb)");
    assert_eq!(compiled.values[1], json!("[1,2]"));
}

#[test]
fn pointer_equality_uses_marker() {
    let compiled = compile(json!({
        "author": {"__type": "Pointer", "className": "_User", "objectId": "u1"}
    }));
    assert_eq!(compiled.pattern, "$2:name = $3");
    assert_eq!(compiled.values, vec![json!("author"), json!("_User$u1")]);
}

#[test]
fn boolean_against_number_never_matches() {
    let compiled = compile(json!({"age": true}));
    assert_eq!(compiled.pattern, "$2:name = $3");
    assert_eq!(compiled.values[1], json!(9_223_372_036_854_775_808u64));
}

#[test]
fn not_equals_includes_missing() {
    let compiled = compile(json!({"title": {"$ne": "x"}}));
    assert_eq!(compiled.pattern, "($2:name <> $3 OR $2:name IS NULL)");
}

#[test]
fn case_insensitive_username() {
    let query = Query::from_json(&json!({"username": "Bob"})).unwrap();
    let compiled = Where::compile(&schema(), &query, 2, true).unwrap();
    assert_eq!(compiled.pattern, "LOWER($2:name) = LOWER($3)");
}

// ---------------------------------------------------------------------------
// Existence and ordering
// ---------------------------------------------------------------------------

#[test]
fn absent_field_does_not_exist() {
    let compiled = compile(json!({"missing": {"$exists": false}}));
    assert!(compiled.is_empty());
    assert!(compiled.values.is_empty());
    assert_eq!(compiled.clause(), "");
}

#[test]
fn exists() {
    assert_eq!(
        compile(json!({"title": {"$exists": true}})).pattern,
        "$2:name IS NOT NULL"
    );
}

#[test]
fn comparators_compile_last() {
    let compiled = compile(json!({"age": {"$gt": 1, "$ne": 5}}));
    assert_eq!(
        compiled.pattern,
        "($2:name <> $3 OR $2:name IS NULL) AND $4:name > $5"
    );
    assert_dense(&compiled);
}

// ---------------------------------------------------------------------------
// Logical operators
// ---------------------------------------------------------------------------

#[test]
fn or_numbering_continues() {
    let compiled = compile(json!({
        "$or": [{"title": "a"}, {"age": {"$gt": 3}}],
        "published": true,
    }));
    assert_eq!(
        compiled.pattern,
        "($2:name = $3 OR $4:name > $5) AND $6:name = $7"
    );
    assert_eq!(
        compiled.values,
        vec![
            json!("title"),
            json!("a"),
            json!("age"),
            json!(3),
            json!("published"),
            json!(true),
        ]
    );
    assert_dense(&compiled);
}

#[test]
fn nested_logical_groups() {
    let compiled = compile(json!({
        "$and": [
            {"$or": [{"title": "a"}, {"title": "b"}]},
            {"$nor": [{"age": 1}]},
        ],
    }));
    assert_eq!(
        compiled.pattern,
        "(($2:name = $3 OR $4:name = $5) AND NOT ($6:name = $7))"
    );
    assert_dense(&compiled);
}

#[test]
fn unconstrained_or_branch_matches_everything() {
    let compiled = compile(json!({
        "$or": [{"missing": {"$exists": false}}, {"title": "x"}],
    }));
    assert_eq!(compiled.pattern, "(TRUE OR $2:name = $3)");
    assert_eq!(compiled.values, vec![json!("title"), json!("x")]);
    assert_dense(&compiled);

    let compiled = compile(json!({
        "$nor": [{"missing": {"$exists": false}}, {"title": "x"}],
    }));
    assert_eq!(compiled.pattern, "NOT (TRUE OR $2:name = $3)");
}

#[test]
fn unconstrained_and_branch_is_skipped() {
    let compiled = compile(json!({
        "$and": [{"missing": {"$exists": false}}, {"title": "x"}],
    }));
    assert_eq!(compiled.pattern, "($2:name = $3)");
}

#[test]
fn empty_logical_groups() {
    assert_eq!(compile(json!({"$or": []})).pattern, "TRUE");
    assert_eq!(compile(json!({"$nor": []})).pattern, "FALSE");
}

// ---------------------------------------------------------------------------
// Regex and text search
// ---------------------------------------------------------------------------

#[test]
fn regex_case_insensitive() {
    let compiled = compile(json!({"title": {"$regex": "^abc", "$options": "i"}}));
    assert_eq!(compiled.pattern, "$2:raw ~* $3");
    assert_eq!(compiled.values, vec![json!("\"title\""), json!("^abc")]);
}

#[test]
fn regex_quotes_stay_in_the_bound_value() {
    let compiled = compile(json!({"title": {"$regex": "o'clock"}}));
    assert_eq!(compiled.pattern, "$2:raw ~ $3");
    assert_eq!(compiled.values[1], json!("o'clock"));
    assert_dense(&compiled);
}

#[test]
fn regex_quoted_span() {
    let compiled = compile(json!({"title": {"$regex": "^\\Qa.b\\E"}}));
    assert_eq!(compiled.values[1], json!("^a\\.b"));
}

#[test]
fn text_search_binds_language_once() {
    let compiled = compile(json!({"title": {"$text": {"$search": {"$term": "rust"}}}}));
    assert_eq!(
        compiled.pattern,
        "to_tsvector($2, $3:name) @@ to_tsquery($2, $4)"
    );
    assert_eq!(
        compiled.values,
        vec![json!("english"), json!("title"), json!("rust")]
    );
}

#[test]
fn text_search_rejects_case_sensitivity() {
    let err = compile_err(json!({
        "title": {"$text": {"$search": {"$term": "x", "$caseSensitive": true}}}
    }));
    assert!(err.is_invalid_json());

    let err = compile_err(json!({
        "title": {"$text": {"$search": {"$term": "x", "$diacriticSensitive": false}}}
    }));
    assert!(err.is_invalid_json());
}

// ---------------------------------------------------------------------------
// Arrays
// ---------------------------------------------------------------------------

#[test]
fn contains_all_starts_with() {
    let compiled = compile(json!({"tags": {"$all": [{"$regex": "^\\Qab\\E"}]}}));
    assert_eq!(
        compiled.pattern,
        "array_contains_all_regex(to_jsonb($2:name), $3::jsonb)"
    );
    assert_eq!(compiled.values[1], json!("[\"ab%\"]"));
}

#[test]
fn contains_all_mixed_is_rejected() {
    let err = compile_err(json!({"tags": {"$all": [{"$regex": "^\\Qa\\E"}, "b"]}}));
    assert!(err.is_invalid_json());
}

// ---------------------------------------------------------------------------
// Geo
// ---------------------------------------------------------------------------

#[test]
fn near_sphere_sorts_by_distance() {
    let compiled = compile(json!({
        "location": {
            "$nearSphere": {"__type": "GeoPoint", "latitude": 10, "longitude": 20},
            "$maxDistance": 0.5,
        }
    }));
    let distance = "ST_DistanceSphere($2:name::geometry, POINT($3, $4)::geometry)";
    assert_eq!(compiled.pattern, format!("{distance} <= $5"));
    assert_eq!(compiled.sorts, vec![format!("{distance} ASC")]);
    assert_eq!(
        compiled.values,
        vec![json!("location"), json!(20.0), json!(10.0), json!(3185500.0)]
    );
}

#[test]
fn within_box() {
    let compiled = compile(json!({
        "location": {"$within": {"$box": [
            {"__type": "GeoPoint", "latitude": 0, "longitude": 0},
            {"__type": "GeoPoint", "latitude": 10, "longitude": 20},
        ]}}
    }));
    assert_eq!(compiled.pattern, "$2:name::point <@ $3::box");
    assert_eq!(
        compiled.values,
        vec![json!("location"), json!("((0, 0), (20, 10))")]
    );
    assert_dense(&compiled);
}

#[test]
fn geo_within_center_sphere() {
    let compiled = compile(json!({
        "location": {"$geoWithin": {"$centerSphere": [[20, 10], 0.1]}}
    }));
    assert_eq!(
        compiled.pattern,
        "ST_DistanceSphere($2:name::geometry, POINT($3, $4)::geometry) <= $5"
    );
    assert_eq!(
        compiled.values,
        vec![json!("location"), json!(20.0), json!(10.0), json!(637100.0)]
    );
    assert!(compiled.sorts.is_empty());
    assert_dense(&compiled);
}

#[test]
fn geo_within_polygon() {
    let compiled = compile(json!({
        "location": {"$geoWithin": {"$polygon": [[0, 0], [0, 1], [1, 1]]}}
    }));
    assert_eq!(compiled.pattern, "$2:name::point <@ $3::polygon");
    assert_eq!(
        compiled.values,
        vec![json!("location"), json!("((0, 0), (0, 1), (1, 1))")]
    );
    assert_dense(&compiled);
}

#[test]
fn geo_within_closed_ring() {
    let compiled = compile(json!({
        "location": {"$geoWithin": {"$polygon": [[0, 0], [0, 1], [1, 1], [0, 0]]}}
    }));
    assert_eq!(compiled.pattern, "$2:name::point <@ $3::polygon");
    assert_eq!(compiled.values[1], json!("((0, 0), (0, 1), (1, 1), (0, 0))"));
    assert_dense(&compiled);
}

#[test]
fn geo_intersects() {
    let schema = schema().with_field("area", FieldType::Polygon);
    let query = Query::from_json(&json!({
        "area": {"$geoIntersects": {"$point": {"__type": "GeoPoint", "latitude": 1, "longitude": 2}}}
    }))
    .unwrap();
    let compiled = compile_where(&schema, &query, 2).unwrap();
    assert_eq!(compiled.pattern, "$2:name::polygon @> $3::point");
    assert_eq!(compiled.values, vec![json!("area"), json!("(2, 1)")]);
    assert_dense(&compiled);
}

#[test]
fn contained_by() {
    let compiled = compile(json!({"tags": {"$containedBy": ["a", "b"]}}));
    assert_eq!(compiled.pattern, "$2:name <@ $3::text[]");
    assert_eq!(compiled.values, vec![json!("tags"), json!(["a", "b"])]);
    assert_dense(&compiled);

    let compiled = compile(json!({"scores": {"$containedBy": [1, 2]}}));
    assert_eq!(compiled.pattern, "$2:name <@ $3::jsonb");
    assert_eq!(compiled.values, vec![json!("scores"), json!("[1,2]")]);
    assert_dense(&compiled);
}

#[test]
fn bad_polygon_fails_fast() {
    let err = compile_err(json!({
        "location": {"$geoWithin": {"$polygon": [[0, 0], [1, 1]]}}
    }));
    assert!(err.is_invalid_json());
}

// ---------------------------------------------------------------------------
// Dotted paths
// ---------------------------------------------------------------------------

#[test]
fn dotted_comparison_casts() {
    let compiled = compile(json!({"meta.count": {"$gt": 3}}));
    assert_eq!(compiled.pattern, "CAST(($2:raw) AS double precision) > $3");
    assert_eq!(compiled.values, vec![json!("\"meta\"->>'count'"), json!(3)]);
}

#[test]
fn dotted_string_equality() {
    let compiled = compile(json!({"meta.kind": "draft"}));
    assert_eq!(compiled.pattern, "$2:raw = $3::text");
}

#[test]
fn dotted_in_uses_containment() {
    let compiled = compile(json!({"meta.kind": {"$in": ["a"]}}));
    assert_eq!(compiled.pattern, "($2:raw)::jsonb @> $3::jsonb");
    assert_eq!(compiled.values[0], json!("\"meta\"->'kind'"));
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[test]
fn unknown_operator_is_forbidden() {
    let err = compile_err(json!({"title": {"$foo": 1}}));
    assert!(err.is_operation_forbidden());
}

#[test]
fn relative_time_is_rejected() {
    let err = Query::from_json(&json!({"createdAt": {"$gt": {"$relativeTime": "1 day ago"}}}))
        .unwrap_err();
    assert!(err.is_invalid_json());
}
