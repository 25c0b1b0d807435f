use super::Constraint;
use crate::{Error, Object, Result};

use serde_json::Value;

/// A backend-agnostic filter, in the order its keys were written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub entries: Vec<QueryEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryEntry {
    Field {
        name: String,
        constraints: Vec<Constraint>,
    },
    And(Vec<Query>),
    Or(Vec<Query>),
    Nor(Vec<Query>),
}

impl Query {
    /// Parses a JSON filter. `null` is the empty filter.
    pub fn from_json(value: &Value) -> Result<Query> {
        match value {
            Value::Null => Ok(Query::default()),
            Value::Object(object) => Query::from_object(object),
            _ => Err(Error::invalid_json(format!("invalid query: {value}"))),
        }
    }

    pub fn from_object(object: &Object) -> Result<Query> {
        let mut entries = Vec::with_capacity(object.len());

        for (key, value) in object {
            let entry = match key.as_str() {
                "$and" => QueryEntry::And(subqueries(key, value)?),
                "$or" => QueryEntry::Or(subqueries(key, value)?),
                "$nor" => QueryEntry::Nor(subqueries(key, value)?),
                _ => QueryEntry::Field {
                    name: key.clone(),
                    constraints: Constraint::parse_field(value)?,
                },
            };
            entries.push(entry);
        }

        Ok(Query { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The constraints on `name`, if the query mentions it at the top level.
    pub fn field(&self, name: &str) -> Option<&[Constraint]> {
        self.entries.iter().find_map(|entry| match entry {
            QueryEntry::Field {
                name: field,
                constraints,
            } if field == name => Some(constraints.as_slice()),
            _ => None,
        })
    }

    /// Top-level fields pinned to a single value by equality, used to seed
    /// the object an upsert creates.
    pub fn equality_values(&self) -> Object {
        let mut values = Object::new();
        for entry in &self.entries {
            if let QueryEntry::Field { name, constraints } = entry {
                for constraint in constraints {
                    if let Constraint::Equals(value) = constraint {
                        values.insert(name.clone(), value.clone());
                    }
                }
            }
        }
        values
    }
}

fn subqueries(operator: &str, value: &Value) -> Result<Vec<Query>> {
    let Value::Array(items) = value else {
        return Err(Error::invalid_json(format!(
            "bad {operator} format - use an array value"
        )));
    };
    items.iter().map(Query::from_json).collect()
}
