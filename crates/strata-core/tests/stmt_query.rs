use serde_json::json;
use strata_core::stmt::{Comparator, Constraint, GeoPoint, Query, QueryEntry};
use strata_core::ErrorCode;

fn constraints(query: serde_json::Value, field: &str) -> Vec<Constraint> {
    Query::from_json(&query)
        .unwrap()
        .field(field)
        .unwrap()
        .to_vec()
}

// ---------------------------------------------------------------------------
// Equality and operators
// ---------------------------------------------------------------------------

#[test]
fn bare_value_is_equality() {
    assert_eq!(
        constraints(json!({"name": "alice"}), "name"),
        vec![Constraint::Equals(json!("alice"))]
    );
}

#[test]
fn typed_value_is_equality() {
    let pointer = json!({"__type": "Pointer", "className": "_User", "objectId": "u1"});
    assert_eq!(
        constraints(json!({"owner": pointer.clone()}), "owner"),
        vec![Constraint::Equals(pointer)]
    );
}

#[test]
fn combined_comparators() {
    assert_eq!(
        constraints(json!({"age": {"$gt": 1, "$lte": 5}}), "age"),
        vec![
            Constraint::Compare(Comparator::Gt, json!(1)),
            Constraint::Compare(Comparator::Lte, json!(5)),
        ]
    );
}

#[test]
fn in_flattens_nested_arrays() {
    assert_eq!(
        constraints(json!({"n": {"$in": [1, [2, 3]]}}), "n"),
        vec![Constraint::In(vec![json!(1), json!(2), json!(3)])]
    );
}

#[test]
fn in_requires_array() {
    let err = Query::from_json(&json!({"n": {"$in": 1}})).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidJson));
    assert_eq!(err.to_string(), "bad $in value");
}

#[test]
fn regex_with_options() {
    assert_eq!(
        constraints(json!({"name": {"$regex": "^a", "$options": "i"}}), "name"),
        vec![Constraint::Regex {
            pattern: "^a".to_string(),
            options: Some("i".to_string())
        }]
    );
}

#[test]
fn unknown_operator_is_kept() {
    assert_eq!(
        constraints(json!({"x": {"$select": {"query": {}}}}), "x"),
        vec![Constraint::Unrecognized {
            operator: "$select".to_string(),
            value: json!({"query": {}}),
        }]
    );
}

#[test]
fn relative_time_rejected() {
    let err = Query::from_json(&json!({"at": {"$lt": {"$relativeTime": "in 1 day"}}})).unwrap_err();
    assert!(err.is_invalid_json());
}

// ---------------------------------------------------------------------------
// Geo
// ---------------------------------------------------------------------------

#[test]
fn near_sphere_max_distance_units() {
    let point = json!({"__type": "GeoPoint", "latitude": 10, "longitude": 20});
    let parsed = constraints(
        json!({"loc": {"$nearSphere": point, "$maxDistanceInKilometers": 6371.0}}),
        "loc",
    );
    assert_eq!(
        parsed,
        vec![Constraint::NearSphere {
            point: GeoPoint::new(10.0, 20.0).unwrap(),
            max_distance: Some(1.0),
        }]
    );
}

#[test]
fn polygon_needs_three_points() {
    let err = Query::from_json(&json!({"loc": {"$geoWithin": {"$polygon": [
        {"__type": "GeoPoint", "latitude": 0, "longitude": 0},
        {"__type": "GeoPoint", "latitude": 1, "longitude": 1},
    ]}}}))
    .unwrap_err();
    assert!(err.is_invalid_json());
}

#[test]
fn polygon_accepts_raw_pairs() {
    let parsed = constraints(
        json!({"loc": {"$geoWithin": {"$polygon": [[0, 0], [10, 0], [10, 5], [0, 0]]}}}),
        "loc",
    );
    let Constraint::GeoWithinPolygon(points) = &parsed[0] else {
        panic!("expected polygon, got {parsed:?}");
    };
    assert_eq!(points.len(), 4);
    // Raw pairs are [longitude, latitude].
    assert_eq!(points[1], GeoPoint::new(0.0, 10.0).unwrap());
}

#[test]
fn center_sphere_rejects_negative_radius() {
    let err = Query::from_json(&json!({"loc": {"$geoWithin": {"$centerSphere": [[0, 0], -1]}}}))
        .unwrap_err();
    assert!(err.is_invalid_json());
}

#[test]
fn out_of_range_latitude() {
    let err = Query::from_json(&json!({"loc": {"$nearSphere": {"__type": "GeoPoint", "latitude": 100, "longitude": 0}}}))
        .unwrap_err();
    assert!(err.is_invalid_json());
}

// ---------------------------------------------------------------------------
// Logical operators
// ---------------------------------------------------------------------------

#[test]
fn or_of_subqueries() {
    let query = Query::from_json(&json!({"$or": [{"a": 1}, {"b": 2}]})).unwrap();
    let [QueryEntry::Or(branches)] = query.entries.as_slice() else {
        panic!("expected $or, got {query:?}");
    };
    assert_eq!(branches.len(), 2);
}

#[test]
fn or_requires_array() {
    let err = Query::from_json(&json!({"$or": {"a": 1}})).unwrap_err();
    assert!(err.is_invalid_json());
}

#[test]
fn equality_values_for_upsert() {
    let query = Query::from_json(&json!({"key": "k1", "n": {"$gt": 3}})).unwrap();
    assert_eq!(
        serde_json::Value::Object(query.equality_values()),
        json!({"key": "k1"})
    );
}
