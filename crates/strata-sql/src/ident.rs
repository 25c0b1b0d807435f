//! Identifier quoting and JSON path rendering.

/// Double-quotes an identifier, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quotes a string literal, doubling embedded single quotes. Text
/// with backslashes becomes an `E''` literal with the backslashes doubled, so
/// it reads the same whatever `standard_conforming_strings` is set to.
pub fn quote_literal(value: &str) -> String {
    let quoted = value.replace('\'', "''");
    if quoted.contains('\\') {
        format!("E'{}'", quoted.replace('\\', "\\\\"))
    } else {
        format!("'{quoted}'")
    }
}

/// Renders the components of a dotted field name: the column quoted as an
/// identifier, array indexes bare, object keys as string literals.
fn components(field: &str) -> Vec<String> {
    field
        .split('.')
        .enumerate()
        .map(|(i, component)| {
            if i == 0 {
                quote_ident(component)
            } else if !component.is_empty() && component.bytes().all(|b| b.is_ascii_digit()) {
                component.to_string()
            } else {
                quote_literal(component)
            }
        })
        .collect()
}

/// `a.b.c` as a `jsonb` path expression: `"a"->'b'->'c'`.
pub fn json_path(field: &str) -> String {
    components(field).join("->")
}

/// `a.b.c` as a `text` path expression: `"a"->'b'->>'c'`. A plain field is
/// its quoted column.
pub fn text_path(field: &str) -> String {
    let mut components = components(field);
    let Some(last) = components.pop() else {
        return quote_ident(field);
    };
    if components.is_empty() {
        return last;
    }
    format!("{}->>{last}", components.join("->"))
}

/// The column a document-style field name is stored in: `_id`, `_created_at`
/// and `_updated_at` take their public spelling and `_p_` pointer prefixes
/// are dropped.
pub fn column_name(name: &str) -> String {
    match name {
        "_id" => "objectId".to_string(),
        "_created_at" => "createdAt".to_string(),
        "_updated_at" => "updatedAt".to_string(),
        _ => name.strip_prefix("_p_").unwrap_or(name).to_string(),
    }
}
