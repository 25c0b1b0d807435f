use super::column_value;
use crate::{ident::column_name, Emitter, Statement};

use serde_json::{Map, Value};
use strata_core::{
    schema::DEFAULT_FIELDS,
    stmt::{Pipeline, Stage},
    ClassSchema, Error, Object, Result,
};

/// A compiled aggregation and what is needed to reshape its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub statement: Statement,

    /// Output column holding a `COUNT(*)`, returned as text by the backend.
    pub count_field: Option<String>,

    /// Aliases of a multi-key `_id`, collapsed back into `objectId`.
    pub group_keys: Vec<String>,
}

impl Aggregate {
    /// Shapes a result row the way the document backend returns it.
    pub fn reshape(&self, mut row: Object) -> Object {
        if !row.contains_key("objectId") {
            row.insert("objectId".to_string(), Value::Null);
        }

        if !self.group_keys.is_empty() {
            let mut id = Map::new();
            for key in &self.group_keys {
                id.insert(key.clone(), row.remove(key).unwrap_or(Value::Null));
            }
            row.insert("objectId".to_string(), Value::Object(id));
        }

        if let Some(field) = &self.count_field {
            if let Some(count) = row.get_mut(field) {
                if let Some(n) = as_count(count) {
                    *count = Value::from(n);
                }
            }
        }

        row
    }
}

/// Compiles `pipeline` into one `SELECT` over the class table bound at `$1`.
pub fn compile_aggregate(
    class_name: &str,
    schema: &ClassSchema,
    pipeline: &Pipeline,
) -> Result<Aggregate> {
    let mut e = Emitter::new(2);
    let mut columns = vec![];
    let mut group_by = None;
    let mut order_by = None;
    let mut limit = None;
    let mut offset = None;
    let mut count_field = None;
    let mut group_keys = vec![];
    let mut matches = Object::new();

    for stage in &pipeline.stages {
        match stage {
            Stage::Group(group) => {
                for (field, value) in group {
                    if field == "_id" {
                        group_by = group_id(&mut e, &mut columns, &mut group_keys, value)?;
                    } else {
                        accumulator(&mut e, &mut columns, &mut count_field, field, value)?;
                    }
                }
            }
            Stage::Project(project) => {
                for (field, value) in project {
                    if matches!(value, Value::Bool(true)) || value.as_i64() == Some(1) {
                        columns.push(e.bind_name(column_name(field)));
                    }
                }
            }
            Stage::Match(filter) => {
                for (key, value) in filter {
                    if key == "$or" {
                        for element in value.as_array().into_iter().flatten() {
                            for (key, value) in element.as_object().into_iter().flatten() {
                                matches.insert(key.clone(), value.clone());
                            }
                        }
                    } else {
                        matches.insert(key.clone(), value.clone());
                    }
                }
            }
            Stage::Sort(sort) => {
                let mut terms = vec![];
                for (field, direction) in sort {
                    let direction = if direction.as_i64() == Some(1) { "ASC" } else { "DESC" };
                    terms.push(format!("{} {direction}", e.bind_name(column_name(field))));
                }
                if !terms.is_empty() {
                    order_by = Some(terms.join(", "));
                }
            }
            Stage::Limit(n) => limit = Some(e.bind(*n)),
            Stage::Skip(n) => offset = Some(e.bind(*n)),
            Stage::Other { name, .. } => {
                return Err(Error::invalid_query(format!(
                    "Postgres doesn't support the {name} aggregation stage"
                )))
            }
        }
    }

    let filter = match_filter(&mut e, schema, &matches)?;

    let mut sql = if columns.is_empty() {
        "SELECT * FROM $1:name".to_string()
    } else {
        format!("SELECT {} FROM $1:name", columns.join(", "))
    };
    if let Some(filter) = filter {
        sql.push_str(&format!(" WHERE {filter}"));
    }
    if let Some(group_by) = group_by {
        sql.push_str(&format!(" GROUP BY {group_by}"));
    }
    if let Some(order_by) = order_by {
        sql.push_str(&format!(" ORDER BY {order_by}"));
    }
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    let mut values = vec![Value::String(class_name.to_string())];
    values.extend(e.into_values());

    tracing::debug!(class_name, %sql, "compiled aggregate");

    Ok(Aggregate {
        statement: Statement::new(sql, values),
        count_field,
        group_keys,
    })
}

/// Compiles a `$group` `_id` and returns its `GROUP BY` terms.
fn group_id(
    e: &mut Emitter,
    columns: &mut Vec<String>,
    group_keys: &mut Vec<String>,
    value: &Value,
) -> Result<Option<String>> {
    match value {
        Value::String(source) if !source.is_empty() => {
            let source = e.bind_name(transform_aggregate_field(source));
            columns.push(format!("{source} AS \"objectId\""));
            Ok(Some(source))
        }
        Value::Object(keys) if !keys.is_empty() => {
            let mut sources: Vec<String> = vec![];

            for (alias, key) in keys {
                let (column, source) = match key {
                    Value::String(source) if !source.is_empty() => {
                        let source = transform_aggregate_field(source);
                        (e.bind_name(&source), source)
                    }
                    Value::Object(operation) => {
                        let Some((operator, source)) = operation.iter().next() else {
                            continue;
                        };
                        let Some(part) = date_part(operator) else {
                            continue;
                        };
                        let source = source.as_str().map(transform_aggregate_field).ok_or_else(|| {
                            Error::invalid_query(format!("Invalid {operator} argument: {source}"))
                        })?;
                        let column = e.bind_name(&source);
                        (
                            format!("EXTRACT({part} FROM {column} AT TIME ZONE 'UTC')::integer"),
                            source,
                        )
                    }
                    _ => continue,
                };

                let quoted = crate::ident::quote_ident(&source);
                if !sources.contains(&quoted) {
                    sources.push(quoted);
                }
                let alias_name = e.bind_name(alias);
                columns.push(format!("{column} AS {alias_name}"));
                group_keys.push(alias.clone());
            }

            if sources.is_empty() {
                return Ok(None);
            }
            Ok(Some(e.bind_raw(sources.join(", "))))
        }
        _ => Ok(None),
    }
}

fn accumulator(
    e: &mut Emitter,
    columns: &mut Vec<String>,
    count_field: &mut Option<String>,
    field: &str,
    value: &Value,
) -> Result<()> {
    let Value::Object(accumulators) = value else {
        return Ok(());
    };

    for (operator, operand) in accumulators {
        let function = match operator.as_str() {
            "$sum" if !operand.is_string() => {
                *count_field = Some(field.to_string());
                let alias = e.bind_name(field);
                columns.push(format!("COUNT(*) AS {alias}"));
                continue;
            }
            "$sum" => "SUM",
            "$max" => "MAX",
            "$min" => "MIN",
            "$avg" => "AVG",
            _ => {
                return Err(Error::invalid_query(format!(
                    "Postgres doesn't support the {operator} accumulator"
                )))
            }
        };

        let source = operand.as_str().ok_or_else(|| {
            Error::invalid_query(format!("Invalid {operator} argument: {operand}"))
        })?;
        let source = e.bind_name(transform_aggregate_field(source));
        let alias = e.bind_name(field);
        columns.push(format!("{function}({source}) AS {alias}"));
    }
    Ok(())
}

/// The folded `$match` filter; comparators first, equality otherwise.
fn match_filter(e: &mut Emitter, schema: &ClassSchema, matches: &Object) -> Result<Option<String>> {
    let mut patterns = vec![];

    for (field, value) in matches {
        let field = if field == "_id" { "objectId" } else { field.as_str() };

        let mut comparisons = vec![];
        if let Value::Object(operators) = value {
            for (operator, operand) in operators {
                let Some(comparator) = comparator(operator) else {
                    continue;
                };
                let column = e.bind_name(field);
                let operand = e.bind(column_value(operand)?);
                comparisons.push(format!("{column} {comparator} {operand}"));
            }
        }

        if !comparisons.is_empty() {
            patterns.push(format!("({})", comparisons.join(" AND ")));
        } else if schema.has_field(field) || DEFAULT_FIELDS.contains(&field) {
            let column = e.bind_name(field);
            let value = e.bind(column_value(value)?);
            patterns.push(format!("{column} = {value}"));
        }
    }

    if patterns.is_empty() {
        Ok(None)
    } else {
        Ok(Some(patterns.join(" AND ")))
    }
}

fn comparator(operator: &str) -> Option<&'static str> {
    Some(match operator {
        "$gt" => ">",
        "$gte" => ">=",
        "$lt" => "<",
        "$lte" => "<=",
        "$eq" => "=",
        "$ne" => "<>",
        _ => return None,
    })
}

fn date_part(operator: &str) -> Option<&'static str> {
    Some(match operator {
        "$dayOfMonth" => "DAY",
        "$dayOfWeek" => "DOW",
        "$dayOfYear" => "DOY",
        "$isoDayOfWeek" => "ISODOW",
        "$isoWeekYear" => "ISOYEAR",
        "$hour" => "HOUR",
        "$minute" => "MINUTE",
        "$second" => "SECOND",
        "$millisecond" => "MILLISECONDS",
        "$month" => "MONTH",
        "$week" => "WEEK",
        "$year" => "YEAR",
        _ => return None,
    })
}

/// `$field` references name storage columns; reserved names map back to
/// their public spelling.
pub(crate) fn transform_aggregate_field(source: &str) -> String {
    column_name(source.strip_prefix('$').unwrap_or(source))
}

fn as_count(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_field_names() {
        assert_eq!(transform_aggregate_field("$_created_at"), "createdAt");
        assert_eq!(transform_aggregate_field("$_updated_at"), "updatedAt");
        assert_eq!(transform_aggregate_field("$_p_author"), "author");
        assert_eq!(transform_aggregate_field("$_id"), "objectId");
        assert_eq!(transform_aggregate_field("$score"), "score");
    }

    #[test]
    fn count_parsing() {
        assert_eq!(as_count(&Value::from("12")), Some(12));
        assert_eq!(as_count(&Value::from(3)), Some(3));
        assert_eq!(as_count(&Value::Null), None);
    }
}
