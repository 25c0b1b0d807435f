use super::{FieldType, IndexKeys};
use crate::{Object, Result};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A class's schema as recorded in `_SCHEMA`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSchema {
    pub class_name: String,

    /// Declared fields, in declaration order.
    #[serde(default)]
    pub fields: IndexMap<String, FieldType>,

    /// Class-level permissions. `None` until explicitly set; readers fill in
    /// the defaults (see [`to_public_schema`](super::to_public_schema)).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_level_permissions: Option<Object>,

    /// Index name to key specification.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub indexes: IndexMap<String, IndexKeys>,
}

impl ClassSchema {
    pub fn new(class_name: impl Into<String>) -> ClassSchema {
        ClassSchema {
            class_name: class_name.into(),
            ..ClassSchema::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: FieldType) -> ClassSchema {
        self.fields.insert(name.into(), ty);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_pointer(&self, name: &str) -> bool {
        self.field(name).is_some_and(FieldType::is_pointer)
    }

    pub fn is_array(&self, name: &str) -> bool {
        self.field(name).is_some_and(FieldType::is_array)
    }

    /// Names of fields stored outside the class's own table/collection.
    pub fn relation_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().filter_map(|(name, ty)| match ty {
            FieldType::Relation(target) => Some((name.as_str(), target.as_str())),
            _ => None,
        })
    }

    pub fn from_json(value: serde_json::Value) -> Result<ClassSchema> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(crate::Error::from)
    }
}
