use crate::Object;

use serde_json::{json, Value};

/// Splits an `ACL` object into the `_rperm` and `_wperm` arrays the backends store.
///
/// `{"*": {"read": true}, "u1": {"read": true, "write": true}}` reads as
/// `["*", "u1"]` and writes as `["u1"]`.
pub fn split_acl(acl: &Object) -> (Vec<Value>, Vec<Value>) {
    let mut read = vec![];
    let mut write = vec![];

    for (entity, permissions) in acl {
        if permissions.get("read") == Some(&Value::Bool(true)) {
            read.push(Value::String(entity.clone()));
        }
        if permissions.get("write") == Some(&Value::Bool(true)) {
            write.push(Value::String(entity.clone()));
        }
    }

    (read, write)
}

/// Rebuilds an `ACL` object from stored permission arrays.
pub fn join_acl(read: &[Value], write: &[Value]) -> Object {
    let mut acl = Object::new();

    for (entities, permission) in [(read, "read"), (write, "write")] {
        for entity in entities.iter().filter_map(Value::as_str) {
            let entry = acl.entry(entity.to_string()).or_insert_with(|| json!({}));
            if let Value::Object(entry) = entry {
                entry.insert(permission.to_string(), Value::Bool(true));
            }
        }
    }

    acl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join() {
        let Value::Object(acl) = json!({
            "*": {"read": true},
            "u1": {"read": true, "write": true},
        }) else {
            panic!("expected object");
        };

        let (read, write) = split_acl(&acl);
        assert_eq!(read, vec![json!("*"), json!("u1")]);
        assert_eq!(write, vec![json!("u1")]);
        assert_eq!(join_acl(&read, &write), acl);
    }
}
