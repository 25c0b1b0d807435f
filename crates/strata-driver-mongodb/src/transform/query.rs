use super::{
    key::storage_key,
    value::{self, geo_point},
};

use bson::{doc, Bson, Document, Regex};
use serde_json::Value;
use strata_core::{
    stmt::{Constraint, Query, QueryEntry, TextSearch},
    ClassSchema, Error, FieldType, Result,
};

/// Translates a query into a filter document.
pub fn transform_where(schema: &ClassSchema, query: &Query) -> Result<Document> {
    let mut filter = Filter::default();

    for entry in &query.entries {
        match entry {
            QueryEntry::And(queries) => {
                if !queries.is_empty() {
                    filter.push("$and", subfilters(schema, queries)?);
                }
            }
            QueryEntry::Or(queries) => {
                if !queries.is_empty() {
                    filter.push("$or", subfilters(schema, queries)?);
                }
            }
            QueryEntry::Nor(queries) => {
                if queries.is_empty() {
                    // An empty `$nor` matches nothing.
                    filter.push("_id", Bson::Document(doc! {"$in": []}));
                } else {
                    filter.push("$nor", subfilters(schema, queries)?);
                }
            }
            QueryEntry::Field { name, constraints } => {
                for (key, value) in transform_field(schema, name, constraints)? {
                    filter.push(&key, value);
                }
            }
        }
    }

    Ok(filter.finish())
}

fn subfilters(schema: &ClassSchema, queries: &[Query]) -> Result<Bson> {
    let filters = queries
        .iter()
        .map(|query| transform_where(schema, query).map(Bson::Document))
        .collect::<Result<_>>()?;
    Ok(Bson::Array(filters))
}

/// Collects top-level conditions. A key written twice moves into `$and`.
#[derive(Default)]
struct Filter {
    document: Document,
    repeated: Vec<Bson>,
}

impl Filter {
    fn push(&mut self, key: &str, value: Bson) {
        if self.document.contains_key(key) {
            let mut condition = Document::new();
            condition.insert(key, value);
            self.repeated.push(Bson::Document(condition));
        } else {
            self.document.insert(key, value);
        }
    }

    fn finish(mut self) -> Document {
        if self.repeated.is_empty() {
            return self.document;
        }
        match self.document.get_mut("$and") {
            Some(Bson::Array(conditions)) => conditions.extend(self.repeated),
            _ => {
                self.document.insert("$and", self.repeated);
            }
        }
        self.document
    }
}

/// How operands of one field are stored.
struct Operand {
    /// Date fields also accept bare ISO strings.
    date: bool,

    /// Array elements and dotted paths hold interior values.
    interior: bool,
}

impl Operand {
    fn of(schema: &ClassSchema, name: &str) -> Operand {
        Operand {
            date: matches!(name, "createdAt" | "updatedAt")
                || schema.field(name) == Some(&FieldType::Date),
            interior: name.contains('.') || schema.is_array(name),
        }
    }

    fn transform(&self, value: &Value) -> Result<Bson> {
        if let (true, Value::String(iso)) = (self.date, value) {
            if let Ok(date) = value::date(iso) {
                return Ok(date);
            }
        }

        if self.interior {
            return value::interior(value);
        }

        value::top_level(value)?.ok_or_else(|| {
            Error::invalid_json(format!("You cannot use {value} as a query parameter."))
        })
    }

    fn transform_all(&self, values: &[Value]) -> Result<Bson> {
        Ok(Bson::Array(
            values
                .iter()
                .map(|value| self.transform(value))
                .collect::<Result<_>>()?,
        ))
    }
}

/// The conditions a field's constraints contribute, keyed by stored name.
/// A text search contributes a top-level `$text` condition.
fn transform_field(
    schema: &ClassSchema,
    name: &str,
    constraints: &[Constraint],
) -> Result<Vec<(String, Bson)>> {
    let key = storage_key(schema, name);
    let operand = Operand::of(schema, name);

    if let [Constraint::Equals(value)] = constraints {
        let value = if schema.is_array(name) && !value.is_array() {
            // Matches arrays holding the value.
            Bson::Document(doc! {"$all": [value::interior(value)?]})
        } else {
            operand.transform(value)?
        };
        return Ok(vec![(key, value)]);
    }

    let mut conditions = vec![];
    let mut operators = Document::new();

    for constraint in constraints {
        match constraint {
            Constraint::Equals(value) => {
                operators.insert("$eq", operand.transform(value)?);
            }
            Constraint::NotEquals(value) => {
                operators.insert("$ne", operand.transform(value)?);
            }
            Constraint::In(values) => {
                operators.insert("$in", operand.transform_all(values)?);
            }
            Constraint::NotIn(values) => {
                operators.insert("$nin", operand.transform_all(values)?);
            }
            Constraint::Exists(exists) => {
                operators.insert("$exists", *exists);
            }
            Constraint::Compare(comparator, value) => {
                operators.insert(comparator.operator(), operand.transform(value)?);
            }
            Constraint::Regex { pattern, options } => {
                operators.insert("$regex", pattern.as_str());
                if let Some(options) = options {
                    operators.insert("$options", options.as_str());
                }
            }
            Constraint::ContainsAll(values) => {
                operators.insert("$all", contains_all(values)?);
            }
            Constraint::ContainedBy(values) => {
                let elements = values
                    .iter()
                    .map(value::interior)
                    .collect::<Result<Vec<_>>>()?;
                // No element outside the list.
                operators.insert("$not", doc! {"$elemMatch": {"$nin": elements}});
            }
            Constraint::TextSearch(search) => {
                conditions.push(("$text".to_string(), Bson::Document(text_search(search))));
            }
            Constraint::NearSphere {
                point,
                max_distance,
            } => {
                operators.insert("$nearSphere", geo_point(point));
                if let Some(max_distance) = max_distance {
                    operators.insert("$maxDistance", *max_distance);
                }
            }
            Constraint::WithinBox(southwest, northeast) => {
                operators.insert(
                    "$within",
                    doc! {"$box": [geo_point(southwest), geo_point(northeast)]},
                );
            }
            Constraint::GeoWithinPolygon(points) => {
                let points: Vec<Bson> = points.iter().map(geo_point).collect();
                operators.insert("$geoWithin", doc! {"$polygon": points});
            }
            Constraint::GeoWithinSphere { center, radius } => {
                operators.insert(
                    "$geoWithin",
                    doc! {"$centerSphere": [geo_point(center), *radius]},
                );
            }
            Constraint::GeoIntersects(point) => {
                operators.insert(
                    "$geoIntersects",
                    doc! {"$geometry": {"type": "Point", "coordinates": geo_point(point)}},
                );
            }
            Constraint::Unrecognized { operator, .. } => {
                return Err(match operator.as_str() {
                    "$select" | "$dontSelect" => Error::command_unavailable(format!(
                        "the {operator} constraint is not supported yet"
                    )),
                    _ => Error::invalid_json(format!("bad constraint: {operator}")),
                });
            }
        }
    }

    if !operators.is_empty() {
        conditions.insert(0, (key, Bson::Document(operators)));
    }
    Ok(conditions)
}

/// `$all` operands are either all starts-with regexes or none are.
fn contains_all(values: &[Value]) -> Result<Bson> {
    let regexes = values
        .iter()
        .filter(|value| value.get("$regex").is_some())
        .count();
    if regexes != 0 && regexes != values.len() {
        return Err(Error::invalid_json(format!(
            "All $all values must be of regex type or none: {}",
            Value::Array(values.to_vec())
        )));
    }

    let elements = values
        .iter()
        .map(|value| match value.get("$regex") {
            Some(Value::String(pattern)) => Ok(Bson::RegularExpression(Regex {
                pattern: pattern.clone(),
                options: value
                    .get("$options")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })),
            Some(other) => Err(Error::invalid_json(format!("bad regex: {other}"))),
            None => value::interior(value),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Bson::Array(elements))
}

fn text_search(search: &TextSearch) -> Document {
    let mut text = doc! {"$search": search.term.as_str()};
    if let Some(language) = &search.language {
        text.insert("$language", language.as_str());
    }
    if let Some(case_sensitive) = search.case_sensitive {
        text.insert("$caseSensitive", case_sensitive);
    }
    if let Some(diacritic_sensitive) = search.diacritic_sensitive {
        text.insert("$diacriticSensitive", diacritic_sensitive);
    }
    text
}
