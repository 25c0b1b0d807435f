use super::{FieldType, DEFAULT_FIELDS};
use crate::{Error, Object, Result};

use indexmap::IndexMap;
use serde_json::{json, Value};

/// An index key specification: field name to direction (`1`, `-1`) or kind
/// (`"text"`, `"2dsphere"`).
pub type IndexKeys = Object;

/// One entry of a submitted index map.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexChange {
    Create(IndexKeys),

    /// `{"__op": "Delete"}`
    Delete,
}

impl IndexChange {
    pub fn from_json(value: &Value) -> Result<IndexChange> {
        let Value::Object(keys) = value else {
            return Err(Error::invalid_json(format!("invalid index specification: {value}")));
        };

        match keys.get("__op") {
            Some(Value::String(op)) if op == "Delete" => Ok(IndexChange::Delete),
            Some(op) => Err(Error::invalid_json(format!("invalid index operation: {op}"))),
            None => Ok(IndexChange::Create(keys.clone())),
        }
    }
}

/// The DDL needed to move a class from its recorded indexes to a submitted set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPlan {
    /// Indexes to build, in submission order.
    pub create: Vec<(String, IndexKeys)>,

    /// Index names to drop.
    pub delete: Vec<String>,

    /// The index metadata to persist once the DDL succeeds.
    pub indexes: IndexMap<String, IndexKeys>,
}

impl IndexPlan {
    /// Computes the plan for `submitted` against the `existing` index
    /// metadata. Pure: no backend is consulted.
    ///
    /// A class with no recorded indexes is treated as having only the
    /// primary-key index `_id_`.
    pub fn diff(
        submitted: &Object,
        existing: &IndexMap<String, IndexKeys>,
        fields: &IndexMap<String, FieldType>,
    ) -> Result<IndexPlan> {
        let mut indexes = existing.clone();
        if indexes.is_empty() {
            let mut id = IndexKeys::new();
            id.insert("_id".to_string(), json!(1));
            indexes.insert("_id_".to_string(), id);
        }

        let mut plan = IndexPlan::default();

        for (name, spec) in submitted {
            match IndexChange::from_json(spec)? {
                IndexChange::Delete => {
                    if indexes.shift_remove(name).is_none() {
                        return Err(Error::invalid_query(format!(
                            "Index {name} does not exist, cannot delete."
                        )));
                    }
                    plan.delete.push(name.clone());
                }
                IndexChange::Create(keys) => {
                    if let Some(current) = indexes.get(name) {
                        if *current == keys {
                            continue;
                        }
                        return Err(Error::invalid_query(format!(
                            "Index {name} exists, cannot update."
                        )));
                    }

                    for key in keys.keys() {
                        let field = key.strip_prefix("_p_").unwrap_or(key);
                        if !fields.contains_key(field) && !DEFAULT_FIELDS.contains(&field) {
                            return Err(Error::invalid_query(format!(
                                "Field {key} does not exist, cannot add index."
                            )));
                        }
                    }

                    indexes.insert(name.clone(), keys.clone());
                    plan.create.push((name.clone(), keys));
                }
            }
        }

        plan.indexes = indexes;
        Ok(plan)
    }

    /// `true` when applying the plan would issue no DDL.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}
