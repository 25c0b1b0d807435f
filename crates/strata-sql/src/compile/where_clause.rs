use super::{
    auth_data_provider, column_value, forbidden_query, json_text, point_literal, polygon_literal,
    polygon_value, radians_to_meters,
};
use crate::{
    ident::{json_path, quote_ident, text_path},
    regex, Emitter,
};

use serde_json::{json, Value};
use strata_core::{
    schema::to_storage_schema,
    stmt::{Atom, Comparator, Constraint, GeoPoint, Query, QueryEntry, TextSearch},
    ClassSchema, Error, FieldType, Result,
};

/// Bound when a boolean is compared against a number column: one past the
/// largest 64-bit integer, which no stored number equals.
const UNSATISFIABLE_NUMBER: u64 = 9_223_372_036_854_775_808;

/// A compiled filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    /// Predicates joined with `AND`. Empty when the query has no constraints.
    pub pattern: String,

    /// Values bound by the pattern, starting at the requested index.
    pub values: Vec<Value>,

    /// Ordering terms the query implies (distance sorts for `$nearSphere`).
    pub sorts: Vec<String>,
}

impl Where {
    /// Compiles `query` against `schema` with placeholders numbered from `start`.
    ///
    /// With `case_insensitive`, equality on `username` and `email` ignores case.
    pub fn compile(
        schema: &ClassSchema,
        query: &Query,
        start: usize,
        case_insensitive: bool,
    ) -> Result<Where> {
        let compiler = Compiler {
            schema: to_storage_schema(schema),
            case_insensitive,
        };

        let mut e = Emitter::new(start);
        compiler.query(&mut e, query)?;

        let (pattern, values, sorts) = e.finish(" AND ");
        Ok(Where {
            pattern,
            values,
            sorts,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// `WHERE <pattern>`, or an empty string for an unconstrained query.
    pub fn clause(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.pattern)
        }
    }
}

/// Compiles `query` with placeholders numbered from `start`.
pub fn compile_where(schema: &ClassSchema, query: &Query, start: usize) -> Result<Where> {
    Where::compile(schema, query, start, false)
}

struct Compiler {
    schema: ClassSchema,
    case_insensitive: bool,
}

impl Compiler {
    fn query(&self, e: &mut Emitter, query: &Query) -> Result<()> {
        for entry in &query.entries {
            match entry {
                QueryEntry::Field { name, constraints } => self.field(e, name, constraints)?,
                // An empty subquery matches everything.
                QueryEntry::And(queries) => self.logical(e, queries, " AND ", "", "TRUE")?,
                QueryEntry::Or(queries) => self.logical(e, queries, " OR ", "", "TRUE")?,
                QueryEntry::Nor(queries) => self.logical(e, queries, " OR ", "NOT ", "FALSE")?,
            }
        }
        Ok(())
    }

    fn logical(
        &self,
        e: &mut Emitter,
        queries: &[Query],
        joiner: &str,
        negation: &str,
        when_empty: &str,
    ) -> Result<()> {
        let mut clauses = vec![];

        for query in queries {
            let mut child = e.child();
            self.query(&mut child, query)?;
            match e.adopt(child, " AND ") {
                Some(clause) => clauses.push(clause),
                // A branch with no condition matches every row.
                None if joiner == " OR " => clauses.push("TRUE".to_string()),
                None => {}
            }
        }

        if clauses.is_empty() {
            e.push(when_empty);
        } else {
            e.push(format!("{negation}({})", clauses.join(joiner)));
        }
        Ok(())
    }

    fn field(&self, e: &mut Emitter, name: &str, constraints: &[Constraint]) -> Result<()> {
        let ty = self.schema.field(name);

        // The column does not exist, so nothing has it.
        if ty.is_none() && constraints.contains(&Constraint::Exists(false)) {
            return Ok(());
        }

        // Auth data is queried through the `authData` column.
        if auth_data_provider(name).is_some() {
            return Ok(());
        }

        let before = e.len();

        let (comparators, others): (Vec<_>, Vec<_>) =
            constraints.iter().partition(|c| c.is_comparator());

        for constraint in others.into_iter().chain(comparators) {
            if let Constraint::Unrecognized { operator, value } = constraint {
                return Err(forbidden_query(json!({ operator: value })));
            }

            if name.contains('.') {
                self.nested(e, name, constraint)?;
            } else {
                self.constraint(e, name, ty, constraint)?;
            }
        }

        if e.len() == before {
            return Err(forbidden_query(format!("on field {name}")));
        }
        Ok(())
    }

    fn constraint(
        &self,
        e: &mut Emitter,
        name: &str,
        ty: Option<&FieldType>,
        constraint: &Constraint,
    ) -> Result<()> {
        match constraint {
            Constraint::Equals(value) => self.equals(e, name, ty, value),
            Constraint::NotEquals(value) => not_equals(e, name, ty, value),
            Constraint::In(values) => contained_in(e, name, ty, values, false),
            Constraint::NotIn(values) => contained_in(e, name, ty, values, true),
            Constraint::Exists(exists) => {
                let column = e.bind_name(name);
                let not = if *exists { "NOT " } else { "" };
                e.push(format!("{column} IS {not}NULL"));
                Ok(())
            }
            Constraint::Regex { pattern, options } => {
                regex_match(e, quote_ident(name), pattern, options.as_deref());
                Ok(())
            }
            Constraint::NearSphere {
                point,
                max_distance,
            } => {
                let distance = distance_to(e, name, point);
                match max_distance {
                    Some(radians) => {
                        let meters = e.bind(radians_to_meters(*radians));
                        e.push(format!("{distance} <= {meters}"));
                    }
                    None => e.push(format!("{distance} IS NOT NULL")),
                }
                e.push_sort(format!("{distance} ASC"));
                Ok(())
            }
            Constraint::GeoWithinSphere { center, radius } => {
                let distance = distance_to(e, name, center);
                let meters = e.bind(radians_to_meters(*radius));
                e.push(format!("{distance} <= {meters}"));
                Ok(())
            }
            Constraint::WithinBox(southwest, northeast) => {
                let column = e.bind_name(name);
                let bounds = e.bind(format!(
                    "({}, {})",
                    point_literal(southwest),
                    point_literal(northeast)
                ));
                e.push(format!("{column}::point <@ {bounds}::box"));
                Ok(())
            }
            Constraint::GeoWithinPolygon(points) => {
                let column = e.bind_name(name);
                let polygon = e.bind(polygon_literal(points));
                e.push(format!("{column}::point <@ {polygon}::polygon"));
                Ok(())
            }
            Constraint::GeoIntersects(point) => {
                let column = e.bind_name(name);
                let point = e.bind(point_literal(point));
                e.push(format!("{column}::polygon @> {point}::point"));
                Ok(())
            }
            Constraint::ContainsAll(values) => contains_all(e, name, ty, values),
            Constraint::ContainedBy(values) => {
                let column = e.bind_name(name);
                if ty.is_some_and(FieldType::is_string_array) {
                    let values = e.bind(Value::Array(values.clone()));
                    e.push(format!("{column} <@ {values}::text[]"));
                } else {
                    let values = e.bind(json_text(&Value::Array(values.clone())));
                    e.push(format!("{column} <@ {values}::jsonb"));
                }
                Ok(())
            }
            Constraint::Compare(comparator, value) => {
                let column = e.bind_name(name);
                let value = e.bind(column_value(value)?);
                e.push(format!("{column} {} {value}", comparator.sql()));
                Ok(())
            }
            Constraint::TextSearch(search) => text_search(e, name, search),
            Constraint::Unrecognized { operator, value } => {
                Err(forbidden_query(json!({ operator: value })))
            }
        }
    }

    fn equals(
        &self,
        e: &mut Emitter,
        name: &str,
        ty: Option<&FieldType>,
        value: &Value,
    ) -> Result<()> {
        if self.case_insensitive && matches!(name, "username" | "email") && value.is_string() {
            let column = e.bind_name(name);
            let value = e.bind(value.clone());
            e.push(format!("LOWER({column}) = LOWER({value})"));
            return Ok(());
        }

        let is_array = ty.is_some_and(FieldType::is_array);
        let is_string_array = ty.is_some_and(FieldType::is_string_array);

        match Atom::classify(value)? {
            Atom::Null => {
                let column = e.bind_name(name);
                e.push(format!("{column} IS NULL"));
            }
            // Relations are stored in join tables; the caller resolves them.
            Atom::Relation { .. } => {}
            Atom::GeoPoint(point) => {
                let column = e.bind_name(name);
                let lng = e.bind(point.longitude);
                let lat = e.bind(point.latitude);
                e.push(format!("{column} ~= POINT({lng}, {lat})"));
            }
            Atom::Polygon(polygon) => {
                let column = e.bind_name(name);
                let polygon = e.bind(polygon_value(&polygon));
                e.push(format!("{column} ~= {polygon}::polygon"));
            }
            Atom::Pointer { .. } if is_array => {
                let column = e.bind_name(name);
                let values = e.bind(json_text(&json!([value])));
                e.push(format!("array_contains({column}, {values}::jsonb)"));
            }
            Atom::Pointer { .. } | Atom::Date(_) | Atom::File { .. } => {
                let column = e.bind_name(name);
                let value = e.bind(column_value(value)?);
                e.push(format!("{column} = {value}"));
            }
            Atom::Bytes(_) | Atom::Plain(Value::Object(_)) => {
                let column = e.bind_name(name);
                let value = e.bind(json_text(value));
                e.push(format!("{column} = {value}::jsonb"));
            }
            Atom::Plain(Value::Array(_)) => {
                let column = e.bind_name(name);
                if is_string_array {
                    let value = e.bind(value.clone());
                    e.push(format!("{column} = {value}::text[]"));
                } else {
                    let value = e.bind(json_text(value));
                    e.push(format!("{column} = {value}::jsonb"));
                }
            }
            Atom::Plain(scalar) => {
                let column = e.bind_name(name);
                if is_string_array {
                    let value = e.bind(scalar.clone());
                    e.push(format!("{column} && ARRAY[{value}]"));
                } else if is_array {
                    let values = e.bind(json_text(&json!([scalar])));
                    e.push(format!("array_contains({column}, {values}::jsonb)"));
                } else if scalar.is_boolean() && ty == Some(&FieldType::Number) {
                    let value = e.bind(UNSATISFIABLE_NUMBER);
                    e.push(format!("{column} = {value}"));
                } else {
                    let value = e.bind(scalar.clone());
                    e.push(format!("{column} = {value}"));
                }
            }
        }
        Ok(())
    }

    /// Constraints on a dotted path into an object column.
    fn nested(&self, e: &mut Emitter, name: &str, constraint: &Constraint) -> Result<()> {
        match constraint {
            Constraint::Equals(Value::Null) => {
                let path = e.bind_raw(text_path(name));
                e.push(format!("{path} IS NULL"));
            }
            Constraint::NotEquals(Value::Null) => {
                let path = e.bind_raw(text_path(name));
                e.push(format!("{path} IS NOT NULL"));
            }
            Constraint::Equals(value) if !value.is_array() && !is_plain_object(value) => {
                let path = cast_path(e, name, value);
                let value = e.bind(column_value(value)?);
                if path.cast {
                    e.push(format!("{} = {value}", path.sql));
                } else {
                    e.push(format!("{} = {value}::text", path.sql));
                }
            }
            Constraint::NotEquals(value) if !value.is_array() && !is_plain_object(value) => {
                let path = cast_path(e, name, value);
                let value = e.bind(column_value(value)?);
                e.push(format!("({0} <> {value} OR {0} IS NULL)", path.sql));
            }
            Constraint::In(values) => {
                let path = e.bind_raw(json_path(name));
                let values = e.bind(json_text(&Value::Array(values.clone())));
                e.push(format!("({path})::jsonb @> {values}::jsonb"));
            }
            Constraint::Exists(exists) => {
                let path = e.bind_raw(text_path(name));
                let not = if *exists { "NOT " } else { "" };
                e.push(format!("{path} IS {not}NULL"));
            }
            Constraint::Regex { pattern, options } => {
                regex_match(e, text_path(name), pattern, options.as_deref());
            }
            Constraint::Compare(comparator, value) => {
                compare_nested(e, name, *comparator, value)?;
            }
            // Not expressible on a nested path; the field-level check rejects
            // the query when nothing else constrains it.
            _ => {}
        }
        Ok(())
    }
}

fn is_plain_object(value: &Value) -> bool {
    value.is_object() && value.get("__type").is_none()
}

struct CastPath {
    sql: String,
    cast: bool,
}

/// The text path of `name`, cast to the operand's type when it has one.
fn cast_path(e: &mut Emitter, name: &str, operand: &Value) -> CastPath {
    let path = e.bind_raw(text_path(name));
    match cast_type(operand) {
        Some(ty) => CastPath {
            sql: format!("CAST(({path}) AS {ty})"),
            cast: true,
        },
        None => CastPath {
            sql: path,
            cast: false,
        },
    }
}

fn cast_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::Number(_) => Some("double precision"),
        Value::Bool(_) => Some("boolean"),
        _ if value.get("__type").and_then(Value::as_str) == Some("Date") => Some("timestamp"),
        _ => None,
    }
}

fn compare_nested(
    e: &mut Emitter,
    name: &str,
    comparator: Comparator,
    value: &Value,
) -> Result<()> {
    let path = cast_path(e, name, value);
    let value = e.bind(column_value(value)?);
    e.push(format!("{} {} {value}", path.sql, comparator.sql()));
    Ok(())
}

fn not_equals(e: &mut Emitter, name: &str, ty: Option<&FieldType>, value: &Value) -> Result<()> {
    let is_array = ty.is_some_and(FieldType::is_array);
    let is_string_array = ty.is_some_and(FieldType::is_string_array);

    if value.is_null() {
        let column = e.bind_name(name);
        e.push(format!("{column} IS NOT NULL"));
        return Ok(());
    }

    let column = e.bind_name(name);

    if is_string_array && !value.is_array() {
        let value = e.bind(column_value(value)?);
        e.push(format!("({column} IS NULL OR NOT ({column} && ARRAY[{value}]))"));
        return Ok(());
    }

    if is_array {
        let values = e.bind(json_text(&json!([value])));
        e.push(format!("NOT array_contains({column}, {values}::jsonb)"));
        return Ok(());
    }

    match Atom::classify(value)? {
        Atom::GeoPoint(point) => {
            let lng = e.bind(point.longitude);
            let lat = e.bind(point.latitude);
            e.push(format!(
                "(NOT {column} ~= POINT({lng}, {lat}) OR {column} IS NULL)"
            ));
        }
        Atom::Bytes(_) | Atom::Plain(Value::Object(_) | Value::Array(_)) => {
            let value = e.bind(json_text(value));
            e.push(format!("({column} <> {value}::jsonb OR {column} IS NULL)"));
        }
        _ => {
            let value = e.bind(column_value(value)?);
            e.push(format!("({column} <> {value} OR {column} IS NULL)"));
        }
    }
    Ok(())
}

fn contained_in(
    e: &mut Emitter,
    name: &str,
    ty: Option<&FieldType>,
    values: &[Value],
    negate: bool,
) -> Result<()> {
    let allow_null = values.iter().any(Value::is_null);
    let items: Vec<&Value> = values.iter().filter(|value| !value.is_null()).collect();

    if ty.is_some_and(FieldType::is_string_array) {
        let column = e.bind_name(name);
        if items.is_empty() {
            e.push(empty_in(&column, negate, allow_null));
            return Ok(());
        }

        let mut placeholders = Vec::with_capacity(items.len());
        for item in items {
            placeholders.push(e.bind(column_value(item)?));
        }
        let overlap = format!("{column} && ARRAY[{}]", placeholders.join(","));

        e.push(match (negate, allow_null) {
            (false, false) => overlap,
            (false, true) => format!("({column} IS NULL OR {overlap})"),
            (true, false) => format!("({column} IS NULL OR NOT ({overlap}))"),
            (true, true) => format!("({column} IS NOT NULL AND NOT ({overlap}))"),
        });
        return Ok(());
    }

    if ty.is_some_and(FieldType::is_array) {
        if values.is_empty() {
            if negate {
                e.push("1 = 1");
            } else {
                let column = e.bind_name(name);
                e.push(format!("{column} IS NULL"));
            }
            return Ok(());
        }

        let column = e.bind_name(name);
        let values = e.bind(json_text(&Value::Array(values.to_vec())));
        let not = if negate { "NOT " } else { "" };
        e.push(format!("{not}array_contains({column}, {values}::jsonb)"));
        return Ok(());
    }

    let column = e.bind_name(name);
    if items.is_empty() {
        e.push(empty_in(&column, negate, allow_null));
        return Ok(());
    }

    let mut placeholders = Vec::with_capacity(items.len());
    for item in items {
        placeholders.push(e.bind(column_value(item)?));
    }
    let list = placeholders.join(",");

    e.push(match (negate, allow_null) {
        (false, false) => format!("{column} IN ({list})"),
        (false, true) => format!("({column} IS NULL OR {column} IN ({list}))"),
        (true, false) => format!("{column} NOT IN ({list})"),
        (true, true) => format!("({column} IS NOT NULL AND {column} NOT IN ({list}))"),
    });
    Ok(())
}

/// An `$in`/`$nin` without non-null elements.
fn empty_in(column: &str, negate: bool, allow_null: bool) -> String {
    match (negate, allow_null) {
        (false, _) => format!("{column} IS NULL"),
        (true, true) => format!("{column} IS NOT NULL"),
        (true, false) => "1 = 1".to_string(),
    }
}

fn contains_all(
    e: &mut Emitter,
    name: &str,
    ty: Option<&FieldType>,
    values: &[Value],
) -> Result<()> {
    let Some(ty) = ty.filter(|ty| ty.is_array()) else {
        // A scalar column can only contain a single value.
        if let [value] = values {
            let column = e.bind_name(name);
            let value = e.bind(column_value(value)?);
            e.push(format!("{column} = {value}"));
        }
        return Ok(());
    };

    let prefixes: Vec<Option<&str>> = values
        .iter()
        .map(|value| {
            value
                .get("$regex")
                .and_then(Value::as_str)
                .filter(|pattern| regex::is_starts_with(pattern))
        })
        .collect();

    let column = e.bind_name(name);
    let array = if ty.is_string_array() {
        format!("to_jsonb({column})")
    } else {
        column
    };

    if prefixes.iter().any(Option::is_some) {
        let Some(prefixes) = prefixes.into_iter().collect::<Option<Vec<_>>>() else {
            return Err(Error::invalid_json(format!(
                "All $all values must be of regex type or none: {}",
                Value::Array(values.to_vec())
            )));
        };

        let patterns: Vec<Value> = prefixes
            .into_iter()
            .map(|pattern| Value::String(regex::starts_with_to_like(pattern)))
            .collect();
        let patterns = e.bind(json_text(&Value::Array(patterns)));
        e.push(format!("array_contains_all_regex({array}, {patterns}::jsonb)"));
    } else {
        let values = e.bind(json_text(&Value::Array(values.to_vec())));
        e.push(format!("array_contains_all({array}, {values}::jsonb)"));
    }
    Ok(())
}

fn regex_match(e: &mut Emitter, target: String, pattern: &str, options: Option<&str>) {
    let options = options.unwrap_or_default();
    let operator = if options.contains('i') { "~*" } else { "~" };

    let pattern = if options.contains('x') {
        regex::strip_extended(pattern)
    } else {
        pattern.to_string()
    };

    let target = e.bind_raw(target);
    let pattern = e.bind(regex::literalize(&pattern));
    e.push(format!("{target} {operator} {pattern}"));
}

fn text_search(e: &mut Emitter, name: &str, search: &TextSearch) -> Result<()> {
    if search.case_sensitive == Some(true) {
        return Err(Error::invalid_json(
            "bad $text: $caseSensitive not supported, please use $regex or create a separate lower case column.",
        ));
    }
    if search.diacritic_sensitive == Some(false) {
        return Err(Error::invalid_json(
            "bad $text: $diacriticSensitive - false not supported, install Postgres Unaccent Extension",
        ));
    }

    let language = e.bind(search.language.as_deref().unwrap_or("english"));
    let column = e.bind_name(name);
    let term = e.bind(search.term.as_str());
    e.push(format!(
        "to_tsvector({language}, {column}) @@ to_tsquery({language}, {term})"
    ));
    Ok(())
}

/// `ST_DistanceSphere` from the column to `point`, binding both.
fn distance_to(e: &mut Emitter, name: &str, point: &GeoPoint) -> String {
    let column = e.bind_name(name);
    let lng = e.bind(point.longitude);
    let lat = e.bind(point.latitude);
    format!("ST_DistanceSphere({column}::geometry, POINT({lng}, {lat})::geometry)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_in_forms() {
        assert_eq!(empty_in("$2:name", false, false), "$2:name IS NULL");
        assert_eq!(empty_in("$2:name", true, false), "1 = 1");
        assert_eq!(empty_in("$2:name", true, true), "$2:name IS NOT NULL");
    }

    #[test]
    fn cast_types() {
        assert_eq!(cast_type(&json!(1.5)), Some("double precision"));
        assert_eq!(cast_type(&json!(false)), Some("boolean"));
        assert_eq!(
            cast_type(&json!({"__type": "Date", "iso": "2024-01-01T00:00:00.000Z"})),
            Some("timestamp")
        );
        assert_eq!(cast_type(&json!("x")), None);
    }
}
