use super::{merge_class_level_permissions, ClassSchema, FieldType};

/// Hidden `_User` columns maintained by the authentication layer.
const USER_HIDDEN_FIELDS: &[(&str, FieldType)] = &[
    ("_hashed_password", FieldType::String),
    ("_email_verify_token", FieldType::String),
    ("_email_verify_token_expires_at", FieldType::Date),
    ("_account_lockout_expires_at", FieldType::Date),
    ("_failed_login_count", FieldType::Number),
    ("_perishable_token", FieldType::String),
    ("_perishable_token_expires_at", FieldType::Date),
    ("_password_changed_at", FieldType::Date),
    ("_password_history", FieldType::Array(None)),
];

/// Prefix of the tables backing relation fields.
const JOIN_PREFIX: &str = "_Join:";

/// The schema as the backend stores it: the ACL field replaced by the
/// `_rperm`/`_wperm` string arrays, plus hidden `_User` columns.
pub fn to_storage_schema(schema: &ClassSchema) -> ClassSchema {
    let mut storage = schema.clone();
    storage.fields.shift_remove("ACL");
    storage
        .fields
        .insert("_rperm".to_string(), FieldType::string_array());
    storage
        .fields
        .insert("_wperm".to_string(), FieldType::string_array());

    if storage.class_name == "_User" {
        for (name, ty) in USER_HIDDEN_FIELDS {
            storage
                .fields
                .entry(name.to_string())
                .or_insert_with(|| ty.clone());
        }
    }

    storage
}

/// The schema as callers see it: permission arrays and the password hash
/// removed, class-level permissions filled in.
pub fn to_public_schema(schema: &ClassSchema) -> ClassSchema {
    let mut public = schema.clone();
    public.fields.shift_remove("_rperm");
    public.fields.shift_remove("_wperm");
    if public.class_name == "_User" {
        public.fields.shift_remove("_hashed_password");
    }
    public.class_level_permissions = Some(merge_class_level_permissions(
        schema.class_level_permissions.as_ref(),
    ));
    public
}

/// Name of the join table holding `field` relations of `class_name`.
pub fn join_table_name(field: &str, class_name: &str) -> String {
    format!("{JOIN_PREFIX}{field}:{class_name}")
}

/// `false` for relation join tables, which are an implementation detail.
pub fn is_user_class(class_name: &str) -> bool {
    !class_name.starts_with(JOIN_PREFIX)
}
