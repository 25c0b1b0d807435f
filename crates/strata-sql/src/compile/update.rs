use super::{auth_data_provider, column_value, json_text, polygon_value};
use crate::Emitter;

use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Value};
use strata_core::{
    schema::to_storage_schema,
    stmt::{Atom, Operation, Update},
    ClassSchema, Error, FieldType, Object, Result,
};

/// Compiled `SET` assignments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignments {
    /// Assignments joined with `, `. Empty when the update changes no column.
    pub pattern: String,
    pub values: Vec<Value>,
}

impl Assignments {
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }
}

/// Compiles `update` into `SET` assignments with placeholders numbered from `start`.
pub fn compile_update(schema: &ClassSchema, update: &Update, start: usize) -> Result<Assignments> {
    let compiler = Compiler {
        schema: to_storage_schema(schema),
        update,
    };

    let mut e = Emitter::new(start);
    compiler.compile(&mut e)?;

    let (pattern, values, _) = e.finish(", ");
    Ok(Assignments { pattern, values })
}

struct Compiler<'a> {
    schema: ClassSchema,
    update: &'a Update,
}

impl Compiler<'_> {
    fn compile(&self, e: &mut Emitter) -> Result<()> {
        let nested_columns: IndexSet<&str> = self
            .update
            .entries
            .keys()
            .filter_map(|key| key.split_once('.').map(|(column, _)| column))
            .collect();

        let mut emitted = IndexSet::new();
        let mut emitted_auth_data = false;

        for (key, op) in &self.update.entries {
            if self.is_auth_data_entry(key, op) {
                if !emitted_auth_data {
                    emitted_auth_data = true;
                    self.auth_data(e)?;
                }
                continue;
            }

            let column = key.split_once('.').map_or(key.as_str(), |(column, _)| column);
            if nested_columns.contains(column) {
                if emitted.insert(column) {
                    self.nested_object(e, column)?;
                }
                continue;
            }

            self.assign(e, key, op)?;
        }
        Ok(())
    }

    /// `_auth_data_<provider>` keys and object-valued `authData` sets fold
    /// into a single assignment of the `authData` column.
    fn is_auth_data_entry(&self, key: &str, op: &Operation) -> bool {
        auth_data_provider(key).is_some()
            || (key == "authData" && matches!(op, Operation::Set(Value::Object(_))))
    }

    fn auth_data(&self, e: &mut Emitter) -> Result<()> {
        let mut providers: IndexMap<&str, Option<&Value>> = IndexMap::new();

        for (key, op) in &self.update.entries {
            if key == "authData" {
                if let Operation::Set(Value::Object(object)) = op {
                    for (provider, value) in object {
                        providers.insert(provider, provider_value(value));
                    }
                }
            } else if let Some(provider) = auth_data_provider(key) {
                let value = match op {
                    Operation::Set(value) => provider_value(value),
                    Operation::Delete => None,
                    _ => return Err(forbidden_update(key)),
                };
                providers.insert(provider, value);
            }
        }

        let column = e.bind_name("authData");
        let mut expr = column.clone();

        for (provider, value) in providers {
            let key = e.bind(provider);
            expr = match value {
                Some(value) => {
                    let value = e.bind(json_text(value));
                    format!(
                        "json_object_set_key(COALESCE({expr}, '{{}}'::jsonb), {key}::text, {value}::jsonb)::jsonb"
                    )
                }
                None => format!("(COALESCE({expr}, '{{}}'::jsonb) - {key}::text)"),
            };
        }

        e.push(format!("{column} = {expr}"));
        Ok(())
    }

    /// Dotted updates into an object column become one merge of the stored
    /// object: removed keys are dropped, increments recomputed from the stored
    /// values, and set keys overlaid.
    fn nested_object(&self, e: &mut Emitter, column: &str) -> Result<()> {
        if self.schema.field(column) != Some(&FieldType::Object) {
            return Err(forbidden_update(column));
        }

        let target = e.bind_name(column);
        let mut expr = format!("COALESCE({target}, '{{}}'::jsonb)");
        let mut patch = Object::new();

        for (key, op) in &self.update.entries {
            if key == column {
                match op {
                    Operation::Set(Value::Object(object)) => {
                        patch.extend(object.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    _ => return Err(forbidden_update(key)),
                }
                continue;
            }

            let Some(path) = key
                .strip_prefix(column)
                .and_then(|rest| rest.strip_prefix('.'))
            else {
                continue;
            };
            let components: Vec<&str> = path.split('.').collect();

            match op {
                Operation::Set(value) => insert_path(&mut patch, &components, value.clone()),
                Operation::Delete => {
                    let path = e.bind(json!(components));
                    expr = format!("{expr} #- {path}::text[]");
                }
                Operation::Increment(amount) if components.len() == 1 => {
                    let field = e.bind(path);
                    let amount = e.bind(Value::Number(amount.clone()));
                    expr = format!(
                        "{expr} || jsonb_build_object({field}::text, COALESCE(({target}->>{field}::text)::numeric, 0) + {amount})"
                    );
                }
                _ => return Err(forbidden_update(key)),
            }
        }

        let patch = e.bind(json_text(&Value::Object(patch)));
        e.push(format!("{target} = ({expr} || {patch}::jsonb)"));
        Ok(())
    }

    fn assign(&self, e: &mut Emitter, name: &str, op: &Operation) -> Result<()> {
        let ty = self.schema.field(name);
        let is_string_array = ty.is_some_and(FieldType::is_string_array);

        match op {
            Operation::Set(Value::Null) | Operation::Delete => {
                let column = e.bind_name(name);
                e.push(format!("{column} = NULL"));
            }
            Operation::Increment(amount) => {
                let column = e.bind_name(name);
                let amount = e.bind(Value::Number(amount.clone()));
                e.push(format!("{column} = COALESCE({column}, 0) + {amount}"));
            }
            Operation::AddToArray { objects, unique } if is_string_array => {
                let column = e.bind_name(name);
                let objects = e.bind(Value::Array(objects.clone()));
                let concat = format!("array_cat(COALESCE({column}, '{{}}'::text[]), {objects}::text[])");
                if *unique {
                    e.push(format!("{column} = ARRAY(SELECT DISTINCT unnest({concat}))"));
                } else {
                    e.push(format!("{column} = {concat}"));
                }
            }
            Operation::AddToArray { objects, unique } => {
                let column = e.bind_name(name);
                let objects = e.bind(json_text(&Value::Array(objects.clone())));
                let function = if *unique { "array_add_unique" } else { "array_add" };
                e.push(format!(
                    "{column} = {function}(COALESCE({column}, '[]'::jsonb), {objects}::jsonb)"
                ));
            }
            Operation::RemoveFromArray(objects) if is_string_array => {
                let column = e.bind_name(name);
                let objects = e.bind(Value::Array(objects.clone()));
                e.push(format!(
                    "{column} = ARRAY(SELECT e FROM unnest(COALESCE({column}, '{{}}'::text[])) e WHERE e <> ALL({objects}::text[]))"
                ));
            }
            Operation::RemoveFromArray(objects) => {
                let column = e.bind_name(name);
                let objects = e.bind(json_text(&Value::Array(objects.clone())));
                e.push(format!(
                    "{column} = array_remove(COALESCE({column}, '[]'::jsonb), {objects}::jsonb)"
                ));
            }
            Operation::Set(value) => self.set(e, name, ty, value)?,
        }
        Ok(())
    }

    fn set(&self, e: &mut Emitter, name: &str, ty: Option<&FieldType>, value: &Value) -> Result<()> {
        match Atom::classify(value)? {
            // Relation membership lives in join tables.
            Atom::Relation { .. } => {}
            Atom::Null => {
                let column = e.bind_name(name);
                e.push(format!("{column} = NULL"));
            }
            Atom::GeoPoint(point) => {
                let column = e.bind_name(name);
                let lng = e.bind(point.longitude);
                let lat = e.bind(point.latitude);
                e.push(format!("{column} = POINT({lng}, {lat})"));
            }
            Atom::Polygon(polygon) => {
                let column = e.bind_name(name);
                let polygon = e.bind(polygon_value(&polygon));
                e.push(format!("{column} = {polygon}::polygon"));
            }
            Atom::Pointer { .. } | Atom::Date(_) | Atom::File { .. } => {
                let column = e.bind_name(name);
                let value = e.bind(column_value(value)?);
                e.push(format!("{column} = {value}"));
            }
            Atom::Bytes(_) => {
                let column = e.bind_name(name);
                let value = e.bind(json_text(value));
                e.push(format!("{column} = {value}::jsonb"));
            }
            Atom::Plain(Value::Array(_)) => match ty {
                Some(ty) if ty.is_string_array() => {
                    let column = e.bind_name(name);
                    let value = e.bind(value.clone());
                    e.push(format!("{column} = {value}::text[]"));
                }
                Some(FieldType::Array(_)) => {
                    let column = e.bind_name(name);
                    let value = e.bind(json_text(value));
                    e.push(format!("{column} = {value}::jsonb"));
                }
                _ => return Err(forbidden_update(value)),
            },
            Atom::Plain(Value::Object(_)) => match ty {
                Some(FieldType::Object) => {
                    let column = e.bind_name(name);
                    let value = e.bind(json_text(value));
                    e.push(format!("{column} = {value}::jsonb"));
                }
                _ => return Err(forbidden_update(value)),
            },
            Atom::Plain(scalar) => {
                let column = e.bind_name(name);
                let value = e.bind(scalar.clone());
                e.push(format!("{column} = {value}"));
            }
        }
        Ok(())
    }
}

/// A provider's auth data, or `None` when it is being removed.
fn provider_value(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        _ if value.get("__op").and_then(Value::as_str) == Some("Delete") => None,
        _ => Some(value),
    }
}

/// Sets `value` at `path` inside `object`, creating intermediate objects.
fn insert_path(object: &mut Object, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = object;
    for parent in parents {
        let entry = current
            .entry(parent.to_string())
            .or_insert_with(|| Value::Object(Object::new()));
        if !entry.is_object() {
            *entry = Value::Object(Object::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

fn forbidden_update(detail: impl std::fmt::Display) -> Error {
    tracing::warn!(%detail, "unsupported update");
    Error::operation_forbidden(format!("Postgres doesn't support update {detail} yet"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_nested_path() {
        let mut object = Object::new();
        insert_path(&mut object, &["a", "b"], json!(1));
        insert_path(&mut object, &["a", "c"], json!(2));
        assert_eq!(Value::Object(object), json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn provider_removal() {
        assert_eq!(provider_value(&json!(null)), None);
        assert_eq!(provider_value(&json!({"__op": "Delete"})), None);
        assert_eq!(
            provider_value(&json!({"id": "x"})),
            Some(&json!({"id": "x"}))
        );
    }
}
