use crate::ident::quote_ident;

use serde_json::Value;
use std::collections::BTreeSet;
use strata_core::{Error, Result};

/// How a placeholder renders its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    /// `$N`: a bound parameter.
    Value,

    /// `$N:name`: a quoted identifier, or a comma-separated list of them.
    Name,

    /// `$N:raw`: inserted verbatim.
    Raw,
}

#[derive(Debug)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder { index: usize, filter: Filter },
}

/// Splits a pattern into literal text and placeholders.
fn segments(pattern: &str) -> Vec<Segment<'_>> {
    let bytes = pattern.as_bytes();
    let mut segments = vec![];
    let mut text_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'$' {
            pos += 1;
            continue;
        }

        let digits_start = pos + 1;
        let mut digits_end = digits_start;
        while digits_end < bytes.len() && bytes[digits_end].is_ascii_digit() {
            digits_end += 1;
        }
        let Ok(index) = pattern[digits_start..digits_end].parse::<usize>() else {
            pos += 1;
            continue;
        };

        let mut end = digits_end;
        let mut filter = Filter::Value;
        if bytes.get(end) == Some(&b':') && bytes.get(end + 1).is_some_and(u8::is_ascii_alphabetic) {
            let word_start = end + 1;
            let mut word_end = word_start;
            while word_end < bytes.len() && bytes[word_end].is_ascii_alphabetic() {
                word_end += 1;
            }
            let word = match &pattern[word_start..word_end] {
                "name" => Some(Filter::Name),
                "raw" => Some(Filter::Raw),
                _ => None,
            };
            if let Some(word) = word {
                filter = word;
                end = word_end;
            }
        }

        if text_start < pos {
            segments.push(Segment::Text(&pattern[text_start..pos]));
        }
        segments.push(Segment::Placeholder { index, filter });
        pos = end;
        text_start = end;
    }

    if text_start < bytes.len() {
        segments.push(Segment::Text(&pattern[text_start..]));
    }
    segments
}

/// Renders `pattern` into statement text and its positional parameters.
///
/// Identifiers (`$N:name`) and raw fragments (`$N:raw`) are written into the
/// text. Every `$N` occurrence becomes the next `$k` parameter of the
/// rendered statement, bound to value `N`. Fails when a placeholder refers to
/// a missing value or a value its filter cannot render.
pub fn prepare(pattern: &str, values: &[Value]) -> Result<(String, Vec<Value>)> {
    let mut sql = String::with_capacity(pattern.len());
    let mut params = vec![];

    for segment in segments(pattern) {
        match segment {
            Segment::Text(text) => sql.push_str(text),
            Segment::Placeholder { index, filter } => {
                let value = index
                    .checked_sub(1)
                    .and_then(|i| values.get(i))
                    .ok_or_else(|| {
                        Error::internal_server_error(format!(
                            "no value bound to placeholder ${index}"
                        ))
                    })?;

                match filter {
                    Filter::Value => {
                        params.push(value.clone());
                        sql.push('$');
                        sql.push_str(&params.len().to_string());
                    }
                    Filter::Name => name(&mut sql, index, value)?,
                    Filter::Raw => raw(&mut sql, index, value)?,
                }
            }
        }
    }

    Ok((sql, params))
}

/// The distinct placeholder indexes a pattern references.
pub fn placeholders(pattern: &str) -> BTreeSet<usize> {
    segments(pattern)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder { index, .. } => Some(index),
            Segment::Text(_) => None,
        })
        .collect()
}

fn raw(sql: &mut String, index: usize, value: &Value) -> Result<()> {
    match value {
        Value::String(raw) => sql.push_str(raw),
        Value::Number(number) => sql.push_str(&number.to_string()),
        _ => {
            return Err(Error::internal_server_error(format!(
                "placeholder ${index}:raw expects text, got {value}"
            )))
        }
    }
    Ok(())
}

fn name(sql: &mut String, index: usize, value: &Value) -> Result<()> {
    match value {
        Value::String(name) => sql.push_str(&quote_ident(name)),
        Value::Array(names) if !names.is_empty() => {
            for (i, name) in names.iter().enumerate() {
                let Value::String(name) = name else {
                    return Err(Error::internal_server_error(format!(
                        "placeholder ${index}:name expects names, got {value}"
                    )));
                };
                if i > 0 {
                    sql.push(',');
                }
                sql.push_str(&quote_ident(name));
            }
        }
        _ => {
            return Err(Error::internal_server_error(format!(
                "placeholder ${index}:name expects a name, got {value}"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholder_filters() {
        let (sql, params) = prepare(
            "SELECT * FROM $1:name WHERE $2:raw ~ $3 AND $4:name = $5",
            &[
                json!("Post"),
                json!("\"title\""),
                json!("^a"),
                json!("author"),
                json!("it's"),
            ],
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"Post\" WHERE \"title\" ~ $1 AND \"author\" = $2"
        );
        assert_eq!(params, [json!("^a"), json!("it's")]);
    }

    #[test]
    fn values_are_never_spliced() {
        let (sql, params) = prepare(
            "SELECT * FROM $1:name WHERE $2:name = $3",
            &[json!("Post"), json!("title"), json!("x\\' OR 1=1 --")],
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM \"Post\" WHERE \"title\" = $1");
        assert_eq!(params, [json!("x\\' OR 1=1 --")]);
    }

    #[test]
    fn casts_are_not_filters() {
        let (sql, params) =
            prepare("$1::jsonb @> $2::text[]", &[json!("[1]"), json!(["a", "b"])]).unwrap();
        assert_eq!(sql, "$1::jsonb @> $2::text[]");
        assert_eq!(params, [json!("[1]"), json!(["a", "b"])]);
    }

    #[test]
    fn repeated_values_bind_once_per_use() {
        let (sql, params) = prepare("$2:name = $1 OR $2:name > $1", &[json!(3), json!("age")]).unwrap();
        assert_eq!(sql, "\"age\" = $1 OR \"age\" > $2");
        assert_eq!(params, [json!(3), json!(3)]);
    }

    #[test]
    fn unbound_placeholder() {
        let err = prepare("$1 = $2", &[json!(1)]).unwrap_err();
        assert!(err.is_internal_server_error());
    }

    #[test]
    fn name_lists() {
        let (sql, params) = prepare("($1:name)", &[json!(["a", "b"])]).unwrap();
        assert_eq!(sql, "(\"a\",\"b\")");
        assert!(params.is_empty());
    }

    #[test]
    fn distinct_placeholders() {
        let indexes = placeholders("$2:name = $3 OR $2:name IS NULL AND x = '$10:raw'");
        assert_eq!(indexes.into_iter().collect::<Vec<_>>(), [2, 3, 10]);
    }
}
