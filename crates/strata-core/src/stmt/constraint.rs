use super::{as_f64, reject_relative_time, GeoPoint};
use crate::{Error, Object, Result};

use serde_json::Value;

/// Mean earth radius, used to turn mile and kilometer distances into radians.
const EARTH_RADIUS_MILES: f64 = 3958.8;
const EARTH_RADIUS_KILOMETERS: f64 = 6371.0;

/// A single predicate on a field.
///
/// A field's constraint object may combine several operators
/// (`{"$gt": 1, "$lt": 5}`); each becomes one `Constraint`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// A bare value or `$eq`.
    Equals(Value),

    /// `$ne`
    NotEquals(Value),

    /// `$in`, one level of nested arrays flattened.
    In(Vec<Value>),

    /// `$nin`, one level of nested arrays flattened.
    NotIn(Vec<Value>),

    /// `$exists`
    Exists(bool),

    /// `$regex` with its sibling `$options`.
    Regex {
        pattern: String,
        options: Option<String>,
    },

    /// `$nearSphere`, with `$maxDistance*` normalized to radians.
    NearSphere {
        point: GeoPoint,
        max_distance: Option<f64>,
    },

    /// `$within: {$box: [southwest, northeast]}`
    WithinBox(GeoPoint, GeoPoint),

    /// `$geoWithin: {$centerSphere: [center, radius]}`, radius in radians.
    GeoWithinSphere { center: GeoPoint, radius: f64 },

    /// `$geoWithin: {$polygon: ..}`
    GeoWithinPolygon(Vec<GeoPoint>),

    /// `$geoIntersects: {$point: ..}`
    GeoIntersects(GeoPoint),

    /// `$all`
    ContainsAll(Vec<Value>),

    /// `$containedBy`
    ContainedBy(Vec<Value>),

    /// `$gt`, `$gte`, `$lt`, `$lte`
    Compare(Comparator, Value),

    /// `$text: {$search: ..}`
    TextSearch(TextSearch),

    /// An operator no backend translates generically (`$select`, `$inQuery`, ...).
    /// Each compiler decides how to reject it.
    Unrecognized { operator: String, value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Full-text search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSearch {
    pub term: String,
    pub language: Option<String>,
    pub case_sensitive: Option<bool>,
    pub diacritic_sensitive: Option<bool>,
}

impl Comparator {
    pub fn from_operator(operator: &str) -> Option<Comparator> {
        Some(match operator {
            "$gt" => Comparator::Gt,
            "$gte" => Comparator::Gte,
            "$lt" => Comparator::Lt,
            "$lte" => Comparator::Lte,
            _ => return None,
        })
    }

    pub fn operator(self) -> &'static str {
        match self {
            Comparator::Gt => "$gt",
            Comparator::Gte => "$gte",
            Comparator::Lt => "$lt",
            Comparator::Lte => "$lte",
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
        }
    }
}

impl Constraint {
    /// Parses the value a query maps a field to.
    ///
    /// Objects with at least one `$`-prefixed key are operator objects; any
    /// other value (including `__type`-tagged atoms) is an equality match.
    pub fn parse_field(value: &Value) -> Result<Vec<Constraint>> {
        match value {
            Value::Object(object) if object.keys().any(|key| key.starts_with('$')) => {
                Constraint::parse_operators(object)
            }
            _ => Ok(vec![Constraint::Equals(value.clone())]),
        }
    }

    fn parse_operators(object: &Object) -> Result<Vec<Constraint>> {
        let mut constraints = vec![];

        for (operator, operand) in object {
            if let Some(comparator) = Comparator::from_operator(operator) {
                reject_relative_time(operand)?;
                constraints.push(Constraint::Compare(comparator, operand.clone()));
                continue;
            }

            let constraint = match operator.as_str() {
                "$eq" => {
                    reject_relative_time(operand)?;
                    Constraint::Equals(operand.clone())
                }
                "$ne" => {
                    reject_relative_time(operand)?;
                    Constraint::NotEquals(operand.clone())
                }
                "$in" => Constraint::In(flatten(operand, operator)?),
                "$nin" => Constraint::NotIn(flatten(operand, operator)?),
                "$exists" => {
                    reject_relative_time(operand)?;
                    Constraint::Exists(truthy(operand))
                }
                "$regex" => {
                    let Value::String(pattern) = operand else {
                        return Err(Error::invalid_json(format!("bad regex: {operand}")));
                    };
                    let options = match object.get("$options") {
                        None | Some(Value::Null) => None,
                        Some(Value::String(options)) => Some(options.clone()),
                        Some(other) => {
                            return Err(Error::invalid_json(format!(
                                "bad $options value: {other}"
                            )))
                        }
                    };
                    Constraint::Regex {
                        pattern: pattern.clone(),
                        options,
                    }
                }
                "$nearSphere" => Constraint::NearSphere {
                    point: GeoPoint::from_json(operand)?,
                    max_distance: max_distance(object)?,
                },
                "$within" => parse_within(operand)?,
                "$geoWithin" => parse_geo_within(operand)?,
                "$geoIntersects" => {
                    let point = operand
                        .get("$point")
                        .filter(|point| point.get("__type").and_then(Value::as_str) == Some("GeoPoint"))
                        .ok_or_else(|| {
                            Error::invalid_json("bad $geoIntersect value; $point should be GeoPoint")
                        })?;
                    Constraint::GeoIntersects(GeoPoint::from_json(point)?)
                }
                "$all" => match operand {
                    Value::Array(values) => Constraint::ContainsAll(values.clone()),
                    _ => return Err(Error::invalid_json("bad $all value")),
                },
                "$containedBy" => match operand {
                    Value::Array(values) => Constraint::ContainedBy(values.clone()),
                    _ => return Err(Error::invalid_json("bad $containedBy: should be an array")),
                },
                "$text" => Constraint::TextSearch(TextSearch::from_json(operand)?),

                // Consumed alongside `$regex` / `$nearSphere`.
                "$options"
                | "$maxDistance"
                | "$maxDistanceInRadians"
                | "$maxDistanceInMiles"
                | "$maxDistanceInKilometers" => continue,

                _ => Constraint::Unrecognized {
                    operator: operator.clone(),
                    value: operand.clone(),
                },
            };

            constraints.push(constraint);
        }

        Ok(constraints)
    }

    pub fn is_comparator(&self) -> bool {
        matches!(self, Constraint::Compare(..))
    }
}

impl TextSearch {
    fn from_json(operand: &Value) -> Result<TextSearch> {
        let Some(Value::Object(search)) = operand.get("$search") else {
            return Err(Error::invalid_json("bad $text: $search, should be object"));
        };

        let term = match search.get("$term") {
            Some(Value::String(term)) if !term.is_empty() => term.clone(),
            _ => return Err(Error::invalid_json("bad $text: $term, should be string")),
        };

        let language = match search.get("$language") {
            None => None,
            Some(Value::String(language)) => Some(language.clone()),
            Some(_) => return Err(Error::invalid_json("bad $text: $language, should be string")),
        };

        let flag = |name: &str| match search.get(name) {
            None => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(_) => Err(Error::invalid_json(format!(
                "bad $text: {name}, should be boolean"
            ))),
        };

        Ok(TextSearch {
            term,
            language,
            case_sensitive: flag("$caseSensitive")?,
            diacritic_sensitive: flag("$diacriticSensitive")?,
        })
    }
}

fn flatten(operand: &Value, operator: &str) -> Result<Vec<Value>> {
    let Value::Array(values) = operand else {
        return Err(Error::invalid_json(format!("bad {operator} value")));
    };

    let mut flattened = vec![];
    for value in values {
        reject_relative_time(value)?;
        match value {
            Value::Array(nested) => flattened.extend(nested.iter().cloned()),
            _ => flattened.push(value.clone()),
        }
    }
    Ok(flattened)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn max_distance(object: &Object) -> Result<Option<f64>> {
    let read = |name: &str| -> Result<Option<f64>> {
        match object.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match as_f64(value) {
                Some(distance) if distance >= 0.0 => Ok(Some(distance)),
                _ => Err(Error::invalid_json(format!("bad {name} value"))),
            },
        }
    };

    if let Some(radians) = read("$maxDistance")? {
        return Ok(Some(radians));
    }
    if let Some(radians) = read("$maxDistanceInRadians")? {
        return Ok(Some(radians));
    }
    if let Some(miles) = read("$maxDistanceInMiles")? {
        return Ok(Some(miles / EARTH_RADIUS_MILES));
    }
    if let Some(kilometers) = read("$maxDistanceInKilometers")? {
        return Ok(Some(kilometers / EARTH_RADIUS_KILOMETERS));
    }
    Ok(None)
}

fn parse_within(operand: &Value) -> Result<Constraint> {
    match operand.get("$box").and_then(Value::as_array).map(Vec::as_slice) {
        Some([southwest, northeast]) => Ok(Constraint::WithinBox(
            GeoPoint::from_json(southwest)?,
            GeoPoint::from_json(northeast)?,
        )),
        _ => Err(Error::invalid_json("malformatted $within arg")),
    }
}

fn parse_geo_within(operand: &Value) -> Result<Constraint> {
    if let Some(polygon) = operand.get("$polygon") {
        return parse_polygon(polygon).map(Constraint::GeoWithinPolygon);
    }

    if let Some(center_sphere) = operand.get("$centerSphere") {
        let Value::Array(parts) = center_sphere else {
            return Err(Error::invalid_json(
                "bad $geoWithin value; $centerSphere should be an array",
            ));
        };
        let [center, radius] = parts.as_slice() else {
            return Err(Error::invalid_json(
                "bad $geoWithin value; $centerSphere should be an array of GeoPoint and distance",
            ));
        };
        let center = GeoPoint::from_json_or_pair(center)?;
        let radius = match as_f64(radius) {
            Some(radius) if radius >= 0.0 => radius,
            _ => {
                return Err(Error::invalid_json(
                    "bad $geoWithin value; $centerSphere distance is invalid",
                ))
            }
        };
        return Ok(Constraint::GeoWithinSphere { center, radius });
    }

    Err(Error::invalid_json(
        "bad $geoWithin value; expected $polygon or $centerSphere",
    ))
}

/// A `$polygon` operand is either a Polygon object (`[lat, lng]` coordinates)
/// or an array of GeoPoints / `[lng, lat]` pairs.
fn parse_polygon(polygon: &Value) -> Result<Vec<GeoPoint>> {
    match polygon {
        Value::Object(object) if object.get("__type").and_then(Value::as_str) == Some("Polygon") => {
            let coordinates = object
                .get("coordinates")
                .and_then(Value::as_array)
                .filter(|coordinates| coordinates.len() >= 3)
                .ok_or_else(|| {
                    Error::invalid_json(
                        "bad $geoWithin value; Polygon.coordinates should contain at least 3 lon/lat pairs",
                    )
                })?;
            coordinates
                .iter()
                .map(|pair| match pair.as_array().map(Vec::as_slice) {
                    Some([lat, lng]) => match (as_f64(lat), as_f64(lng)) {
                        (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
                        _ => Err(Error::invalid_json("bad $geoWithin value")),
                    },
                    _ => Err(Error::invalid_json("bad $geoWithin value")),
                })
                .collect()
        }
        Value::Array(points) => {
            if points.len() < 3 {
                return Err(Error::invalid_json(
                    "bad $geoWithin value; $polygon should contain at least 3 GeoPoints",
                ));
            }
            points.iter().map(GeoPoint::from_json_or_pair).collect()
        }
        _ => Err(Error::invalid_json(
            "bad $geoWithin value; $polygon should be Polygon object or Array of GeoPoints",
        )),
    }
}
