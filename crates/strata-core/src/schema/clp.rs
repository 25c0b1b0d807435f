use crate::Object;

use serde_json::{json, Value};

/// Operations a class-level permission record always carries.
pub const CLP_OPERATIONS: &[&str] = &[
    "find",
    "count",
    "get",
    "create",
    "update",
    "delete",
    "addField",
];

/// Permissions of a class that never had any set: everything public, nothing protected.
pub fn default_class_level_permissions() -> Object {
    let mut clp = Object::new();
    for op in CLP_OPERATIONS {
        clp.insert(op.to_string(), json!({ "*": true }));
    }
    clp.insert("protectedFields".to_string(), json!({ "*": [] }));
    clp
}

/// Overlays explicitly stored permissions on an empty record so every
/// operation key is present.
pub fn merge_class_level_permissions(stored: Option<&Object>) -> Object {
    let Some(stored) = stored else {
        return default_class_level_permissions();
    };

    let mut clp = Object::new();
    for op in CLP_OPERATIONS {
        clp.insert(op.to_string(), Value::Object(Object::new()));
    }
    clp.insert("protectedFields".to_string(), Value::Object(Object::new()));

    for (key, value) in stored {
        clp.insert(key.clone(), value.clone());
    }
    clp
}
