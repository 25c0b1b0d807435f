use super::{
    key::{storage_key, AUTH_DATA_PREFIX, POINTER_PREFIX},
    value,
};

use bson::{doc, Bson, Document};
use serde_json::Value;
use strata_core::{
    stmt::{split_acl, validate_keys, Atom, Operation, Update},
    ClassSchema, FieldType, Result,
};

/// Translates an update into `$set`, `$unset`, `$inc`, `$push`,
/// `$addToSet` and `$pullAll` operators. Returns an empty document when
/// nothing is stored, e.g. an update touching only relations.
pub fn transform_update(schema: &ClassSchema, update: &Update) -> Result<Document> {
    let mut ops = Operators::default();

    for (field, operation) in &update.entries {
        match field.as_str() {
            "ACL" => {
                acl(&mut ops, operation)?;
                continue;
            }
            "authData" => {
                auth_data(&mut ops, operation)?;
                continue;
            }
            _ => {}
        }

        if schema.field(field).is_some_and(FieldType::is_relation) {
            continue;
        }

        match operation {
            Operation::Set(value) => {
                validate_keys(value)?;
                if let Some((key, value)) = set_value(schema, field, value)? {
                    ops.set.insert(key, value);
                }
            }
            Operation::Delete => {
                ops.unset.insert(storage_key(schema, field), "");
            }
            Operation::Increment(amount) => {
                ops.inc.insert(storage_key(schema, field), value::number(amount));
            }
            Operation::AddToArray { objects, unique } => {
                let each = doc! {"$each": elements(objects)?};
                if *unique {
                    ops.add_to_set.insert(storage_key(schema, field), each);
                } else {
                    ops.push.insert(storage_key(schema, field), each);
                }
            }
            Operation::RemoveFromArray(objects) => {
                ops.pull_all.insert(storage_key(schema, field), elements(objects)?);
            }
        }
    }

    Ok(ops.finish())
}

#[derive(Default)]
struct Operators {
    set: Document,
    unset: Document,
    inc: Document,
    push: Document,
    add_to_set: Document,
    pull_all: Document,
}

impl Operators {
    fn finish(self) -> Document {
        let mut update = Document::new();
        for (operator, fields) in [
            ("$set", self.set),
            ("$unset", self.unset),
            ("$inc", self.inc),
            ("$push", self.push),
            ("$addToSet", self.add_to_set),
            ("$pullAll", self.pull_all),
        ] {
            if !fields.is_empty() {
                update.insert(operator, fields);
            }
        }
        update
    }
}

/// The stored key and value a top-level assignment writes. A pointer value
/// goes under the `_p_` key even when the schema does not declare it yet.
pub(crate) fn set_value(
    schema: &ClassSchema,
    field: &str,
    value: &Value,
) -> Result<Option<(String, Bson)>> {
    if field.contains('.') {
        return Ok(Some((storage_key(schema, field), value::interior(value)?)));
    }

    let is_date = matches!(field, "createdAt" | "updatedAt")
        || schema.field(field) == Some(&FieldType::Date);
    if let (true, Value::String(iso)) = (is_date, value) {
        return Ok(Some((storage_key(schema, field), value::date(iso)?)));
    }

    let key = match Atom::classify(value)? {
        Atom::Pointer { .. } if !schema.is_pointer(field) => format!("{POINTER_PREFIX}{field}"),
        _ => storage_key(schema, field),
    };
    Ok(value::top_level(value)?.map(|value| (key, value)))
}

fn elements(objects: &[Value]) -> Result<Vec<Bson>> {
    objects.iter().map(value::interior).collect()
}

fn acl(ops: &mut Operators, operation: &Operation) -> Result<()> {
    match operation {
        Operation::Set(Value::Object(acl)) => {
            let (read, write) = split_acl(acl);
            ops.set
                .insert("_rperm", value::interior(&Value::Array(read))?);
            ops.set
                .insert("_wperm", value::interior(&Value::Array(write))?);
        }
        Operation::Set(Value::Null) | Operation::Delete => {
            ops.unset.insert("_rperm", "");
            ops.unset.insert("_wperm", "");
        }
        other => tracing::warn!(?other, "unsupported update of ACL"),
    }
    Ok(())
}

/// `authData` is stored one provider per key; a `null` provider unlinks it.
fn auth_data(ops: &mut Operators, operation: &Operation) -> Result<()> {
    match operation {
        Operation::Set(Value::Object(providers)) => {
            for (provider, data) in providers {
                let key = format!("{AUTH_DATA_PREFIX}{provider}");
                if data.is_null() {
                    ops.unset.insert(key, "");
                } else {
                    validate_keys(data)?;
                    ops.set.insert(key, value::interior(data)?);
                }
            }
        }
        other => tracing::warn!(?other, "unsupported update of authData"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn acl_splits_into_permission_arrays() {
        let update = Update::from_json(&json!({
            "ACL": {"*": {"read": true}, "u1": {"read": true, "write": true}}
        }))
        .unwrap();
        let document = transform_update(&ClassSchema::new("Post"), &update).unwrap();
        assert_eq!(
            document,
            doc! {"$set": {"_rperm": ["*", "u1"], "_wperm": ["u1"]}}
        );
    }

    #[test]
    fn auth_data_providers() {
        let update = Update::from_json(&json!({
            "authData": {"github": {"id": "7"}, "twitter": null}
        }))
        .unwrap();
        let document = transform_update(&ClassSchema::new("_User"), &update).unwrap();
        assert_eq!(
            document,
            doc! {
                "$set": {"_auth_data_github": {"id": "7"}},
                "$unset": {"_auth_data_twitter": ""},
            }
        );
    }
}
