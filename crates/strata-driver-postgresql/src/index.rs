use crate::transaction::Transaction;

use serde_json::{json, Value};
use strata_core::{
    schema::{IndexKeys, IndexPlan},
    Object, Result,
};
use strata_sql::{ident::column_name, Statement};

/// The name an index gets when none is given: `<field>_<direction>` pairs
/// joined by `_`, e.g. `title_1_age_-1`.
pub(crate) fn default_index_name(keys: &IndexKeys) -> String {
    keys.iter()
        .map(|(field, direction)| match direction {
            Value::String(kind) => format!("{field}_{kind}"),
            other => format!("{field}_{other}"),
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// The columns an index key specification covers.
pub(crate) fn index_columns(keys: &IndexKeys) -> Vec<String> {
    keys.keys().map(String::as_str).map(column_name).collect()
}

pub(crate) fn create_index_statement(table: &str, name: &str, keys: &IndexKeys) -> Statement {
    Statement::create_index(name, table, &index_columns(keys), false)
}

/// Index metadata as the schema record stores it.
pub(crate) fn indexes_json<'a>(indexes: impl IntoIterator<Item = (&'a String, &'a IndexKeys)>) -> Value {
    Value::Object(
        indexes
            .into_iter()
            .map(|(name, keys)| (name.clone(), Value::Object(keys.clone())))
            .collect::<Object>(),
    )
}

/// Runs the DDL of `plan` and persists its index metadata.
pub(crate) async fn apply_plan(tx: &mut Transaction<'_>, table: &str, plan: &IndexPlan) -> Result<()> {
    for (name, keys) in &plan.create {
        tx.execute(&create_index_statement(table, name, keys)).await?;
    }
    for name in &plan.delete {
        tx.execute(&Statement::drop_index(name)).await?;
    }
    tx.execute(&Statement::set_class_record_key(
        table,
        "indexes",
        indexes_json(&plan.indexes),
    ))
    .await?;
    Ok(())
}

/// Reads the key specification back out of a `pg_indexes.indexdef`, e.g.
/// `CREATE INDEX title_1 ON public."Post" USING btree (title, "createdAt" DESC)`.
pub(crate) fn parse_index_definition(definition: &str) -> IndexKeys {
    let mut keys = IndexKeys::new();
    let Some(columns) = column_list(definition) else {
        return keys;
    };

    for term in split_terms(columns) {
        let term = term.trim();
        let direction = if term.ends_with(" DESC") { -1 } else { 1 };

        let expression = term.split_whitespace().next().unwrap_or(term);
        let column = expression
            .strip_prefix("lower(")
            .and_then(|inner| inner.strip_suffix(')'))
            .unwrap_or(expression);

        let column = column
            .strip_prefix('"')
            .and_then(|column| column.strip_suffix('"'))
            .map(|column| column.replace("\"\"", "\""))
            .unwrap_or_else(|| column.to_string());

        keys.insert(column, json!(direction));
    }

    keys
}

/// The text inside the parentheses following `USING <method>`.
fn column_list(definition: &str) -> Option<&str> {
    let start = definition.find(" USING ")?;
    let open = start + definition[start..].find('(')?;

    let mut depth = 0;
    let mut quoted = false;
    for (i, c) in definition[open..].char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth -= 1;
                if depth == 0 {
                    return Some(&definition[open + 1..open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits on commas outside parentheses and quotes.
fn split_terms(columns: &str) -> Vec<&str> {
    let mut terms = vec![];
    let mut depth = 0;
    let mut quoted = false;
    let mut start = 0;

    for (i, c) in columns.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                terms.push(&columns[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&columns[start..]);
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(value: Value) -> IndexKeys {
        match value {
            Value::Object(keys) => keys,
            _ => unreachable!(),
        }
    }

    #[test]
    fn default_names() {
        assert_eq!(
            default_index_name(&keys(json!({"title": 1, "age": -1}))),
            "title_1_age_-1"
        );
        assert_eq!(
            default_index_name(&keys(json!({"body": "text"}))),
            "body_text"
        );
    }

    #[test]
    fn index_columns_use_stored_names() {
        assert_eq!(
            index_columns(&keys(json!({"_p_author": 1, "_created_at": -1}))),
            vec!["author", "createdAt"]
        );
    }

    #[test]
    fn parse_definitions() {
        assert_eq!(
            parse_index_definition(
                "CREATE UNIQUE INDEX \"Post_pkey\" ON public.\"Post\" USING btree (\"objectId\")"
            ),
            keys(json!({"objectId": 1}))
        );
        assert_eq!(
            parse_index_definition(
                "CREATE INDEX title_age ON public.\"Post\" USING btree (title, \"createdAt\" DESC)"
            ),
            keys(json!({"title": 1, "createdAt": -1}))
        );
        assert_eq!(
            parse_index_definition(
                "CREATE INDEX email_ci ON public.\"_User\" USING btree (lower(email) varchar_pattern_ops)"
            ),
            keys(json!({"email": 1}))
        );
    }

    #[test]
    fn parse_garbage() {
        assert!(parse_index_definition("not an index").is_empty());
    }
}
