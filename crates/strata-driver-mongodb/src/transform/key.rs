use bson::{Bson, Document};
use indexmap::IndexMap;
use strata_core::{adapter::Direction, ClassSchema};

/// Prefix of the keys holding pointer markers.
pub const POINTER_PREFIX: &str = "_p_";

/// Prefix of the per-provider keys `authData` is stored under.
pub const AUTH_DATA_PREFIX: &str = "_auth_data_";

/// The stored key for a public field name.
///
/// Pointer fields live under `_p_<field>`; `authData.<provider>.<path>`
/// addresses the provider's own `_auth_data_<provider>` key.
pub fn storage_key(schema: &ClassSchema, name: &str) -> String {
    match name {
        "objectId" => "_id".to_string(),
        "createdAt" => "_created_at".to_string(),
        "updatedAt" => "_updated_at".to_string(),
        _ if schema.is_pointer(name) => format!("{POINTER_PREFIX}{name}"),
        _ => match name
            .strip_prefix("authData.")
            .and_then(|path| path.split_once('.'))
        {
            Some((provider, path)) => format!("{AUTH_DATA_PREFIX}{provider}.{path}"),
            None => name.to_string(),
        },
    }
}

/// The public field name for a stored key.
pub fn public_key(key: &str) -> &str {
    match key {
        "_id" => "objectId",
        "_created_at" => "createdAt",
        "_updated_at" => "updatedAt",
        _ => key.strip_prefix(POINTER_PREFIX).unwrap_or(key),
    }
}

/// The provider an `_auth_data_<provider>` key belongs to.
pub fn auth_data_provider(key: &str) -> Option<&str> {
    key.strip_prefix(AUTH_DATA_PREFIX)
        .filter(|provider| !provider.is_empty() && !provider.contains('.'))
}

pub fn sort(schema: &ClassSchema, sort: &IndexMap<String, Direction>) -> Option<Document> {
    if sort.is_empty() {
        return None;
    }
    Some(
        sort.iter()
            .map(|(field, direction)| (storage_key(schema, field), Bson::Int32(direction.as_i32())))
            .collect(),
    )
}

/// A projection over `keys`. The id and timestamps are always returned,
/// `ACL` selects the permission arrays and relations are dropped.
pub fn projection(schema: &ClassSchema, keys: Option<&[String]>) -> Option<Document> {
    let keys = keys?;

    let mut projection = Document::new();
    for key in ["_id", "_created_at", "_updated_at"] {
        projection.insert(key, 1);
    }

    for key in keys {
        if key == "ACL" {
            projection.insert("_rperm", 1);
            projection.insert("_wperm", 1);
        } else if !schema.field(key).is_some_and(|ty| ty.is_relation()) {
            projection.insert(storage_key(schema, key), 1);
        }
    }
    Some(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::FieldType;

    fn schema() -> ClassSchema {
        ClassSchema::new("Post")
            .with_field("author", FieldType::Pointer("_User".to_string()))
            .with_field("likes", FieldType::Relation("_User".to_string()))
    }

    #[test]
    fn reserved_names() {
        let schema = schema();
        assert_eq!(storage_key(&schema, "objectId"), "_id");
        assert_eq!(storage_key(&schema, "updatedAt"), "_updated_at");
        assert_eq!(storage_key(&schema, "author"), "_p_author");
        assert_eq!(storage_key(&schema, "authData.github.id"), "_auth_data_github.id");
        assert_eq!(storage_key(&schema, "meta.kind"), "meta.kind");

        assert_eq!(public_key("_created_at"), "createdAt");
        assert_eq!(public_key("_p_author"), "author");
        assert_eq!(public_key("title"), "title");
    }

    #[test]
    fn projection_expands_acl_and_drops_relations() {
        let keys = ["author".to_string(), "likes".to_string(), "ACL".to_string()];
        let projection = projection(&schema(), Some(&keys)).unwrap();
        let names: Vec<&str> = projection.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            ["_id", "_created_at", "_updated_at", "_p_author", "_rperm", "_wperm"]
        );
    }
}
