use crate::{Error, Object, Result};

use indexmap::IndexMap;
use serde_json::{Number, Value};

/// A backend-agnostic mutation: field name to operation, in written order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub entries: IndexMap<String, Operation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Set(Value),

    /// `{"__op": "Delete"}`
    Delete,

    /// `{"__op": "Increment", "amount": n}`
    Increment(Number),

    /// `{"__op": "Add" | "AddUnique", "objects": [..]}`
    AddToArray { objects: Vec<Value>, unique: bool },

    /// `{"__op": "Remove", "objects": [..]}`
    RemoveFromArray(Vec<Value>),
}

impl Operation {
    pub fn from_json(value: &Value) -> Result<Operation> {
        let Some(op) = value.get("__op") else {
            return Ok(Operation::Set(value.clone()));
        };

        let objects = |message: &str| match value.get("objects") {
            Some(Value::Array(objects)) => Ok(objects.clone()),
            _ => Err(Error::invalid_json(message)),
        };

        match op.as_str() {
            Some("Delete") => Ok(Operation::Delete),
            Some("Increment") => match value.get("amount") {
                Some(Value::Number(amount)) => Ok(Operation::Increment(amount.clone())),
                _ => Err(Error::invalid_json("incrementing must provide a number")),
            },
            Some("Add") => Ok(Operation::AddToArray {
                objects: objects("objects to add must be an array")?,
                unique: false,
            }),
            Some("AddUnique") => Ok(Operation::AddToArray {
                objects: objects("objects to add must be an array")?,
                unique: true,
            }),
            Some("Remove") => Ok(Operation::RemoveFromArray(objects(
                "objects to remove must be an array",
            )?)),
            _ => Err(Error::command_unavailable(format!(
                "The {op} operator is not supported yet."
            ))),
        }
    }
}

impl Update {
    pub fn from_json(value: &Value) -> Result<Update> {
        match value {
            Value::Object(object) => Update::from_object(object),
            _ => Err(Error::invalid_json(format!("invalid update: {value}"))),
        }
    }

    pub fn from_object(object: &Object) -> Result<Update> {
        let entries = object
            .iter()
            .map(|(key, value)| Ok((key.clone(), Operation::from_json(value)?)))
            .collect::<Result<_>>()?;
        Ok(Update { entries })
    }

    pub fn set(mut self, field: impl Into<String>, value: Value) -> Update {
        self.entries.insert(field.into(), Operation::Set(value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The values an upsert writes when no object matched: sets and
    /// increments contribute their operand, array additions their objects.
    pub fn insert_values(&self) -> Object {
        let mut values = Object::new();
        for (field, operation) in &self.entries {
            let value = match operation {
                Operation::Set(value) => value.clone(),
                Operation::Increment(amount) => Value::Number(amount.clone()),
                Operation::AddToArray { objects, .. } => Value::Array(objects.clone()),
                Operation::Delete | Operation::RemoveFromArray(_) => continue,
            };
            values.insert(field.clone(), value);
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_operator() {
        let err = Operation::from_json(&json!({"__op": "Batch", "ops": []})).unwrap_err();
        assert!(err.is_command_unavailable());
    }

    #[test]
    fn increment_requires_number() {
        let err = Operation::from_json(&json!({"__op": "Increment", "amount": "1"})).unwrap_err();
        assert!(err.is_invalid_json());
    }
}
