use regex::Regex;
use std::sync::LazyLock;
use strata_core::Error;
use tokio_postgres::error::SqlState;

/// Message reported for every unique-index violation.
const DUPLICATE_VALUE: &str = "A duplicate value for a field with unique values was provided";

static UNIQUE_CONSTRAINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"unique_([a-zA-Z]+)").unwrap());

static DETAIL_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Key \("?(\w+)"?\)="#).unwrap());

/// The native failures the adapter reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Native {
    /// `23505`
    UniqueViolation,
    /// `42P07`
    DuplicateRelation,
    /// `42701`
    DuplicateColumn,
    /// `42710`
    DuplicateObject,
    /// `42P01`
    UndefinedTable,
    /// `42703`
    UndefinedColumn,
    /// `25P02`, raised by every statement after a failed one in a transaction.
    TransactionAborted,
}

impl Native {
    pub(crate) fn from_code(code: &str) -> Option<Native> {
        Some(match code {
            "23505" => Native::UniqueViolation,
            "42P07" => Native::DuplicateRelation,
            "42701" => Native::DuplicateColumn,
            "42710" => Native::DuplicateObject,
            "42P01" => Native::UndefinedTable,
            "42703" => Native::UndefinedColumn,
            "25P02" => Native::TransactionAborted,
            _ => return None,
        })
    }

    /// Classifies a driver error by its SQLSTATE.
    pub(crate) fn of(err: &tokio_postgres::Error) -> Option<Native> {
        err.code().map(SqlState::code).and_then(Native::from_code)
    }

    /// Finds the native failure wrapped by an adapter error, if any.
    pub(crate) fn of_error(err: &Error) -> Option<Native> {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(err) = source {
            if let Some(err) = err.downcast_ref::<tokio_postgres::Error>() {
                return Native::of(err);
            }
            source = err.source();
        }
        None
    }
}

/// Maps a driver error onto the taxonomy. Only unique violations carry a
/// code; everything else is preserved verbatim.
pub(crate) fn map_error(err: tokio_postgres::Error) -> Error {
    if Native::of(&err) != Some(Native::UniqueViolation) {
        return Error::driver(err);
    }

    let db = err.as_db_error();
    match duplicated_field(
        db.and_then(|db| db.constraint()),
        db.and_then(|db| db.detail()),
    ) {
        Some(field) => Error::duplicate_value_on(DUPLICATE_VALUE, field),
        None => Error::duplicate_value(DUPLICATE_VALUE),
    }
}

pub(crate) fn map_pool_error(err: deadpool_postgres::PoolError) -> Error {
    match err {
        deadpool_postgres::PoolError::Backend(err) => map_error(err),
        err => {
            tracing::error!(error = %err, "unable to get a connection from the pool");
            Error::driver(err)
        }
    }
}

/// The field a unique violation reports, from the constraint name
/// (`<table>_unique_<field>`) or from the `Key ("field")=(..)` detail.
pub(crate) fn duplicated_field(constraint: Option<&str>, detail: Option<&str>) -> Option<String> {
    constraint
        .and_then(|constraint| UNIQUE_CONSTRAINT.captures(constraint))
        .or_else(|| detail.and_then(|detail| DETAIL_KEY.captures(detail)))
        .map(|captures| captures[1].to_string())
}

/// Reports an unexpected failure while deleting objects: the cause is logged
/// and the caller sees a generic internal error.
pub(crate) fn delete_failure(err: Error) -> Error {
    tracing::error!(error = %err, "error deleting objects");
    Error::internal_server_error("Database adapter error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ErrorCode;

    #[test]
    fn delete_failures_are_internal() {
        let err = delete_failure(Error::from(anyhow::anyhow!("connection reset")));
        assert!(err.is_internal_server_error());
        assert_eq!(err.code(), Some(ErrorCode::InternalServerError));
        assert_eq!(err.to_string(), "Database adapter error");
    }

    #[test]
    fn codes() {
        assert_eq!(Native::from_code("23505"), Some(Native::UniqueViolation));
        assert_eq!(Native::from_code("42P01"), Some(Native::UndefinedTable));
        assert_eq!(Native::from_code("25P02"), Some(Native::TransactionAborted));
        assert_eq!(Native::from_code("22P02"), None);
    }

    #[test]
    fn field_from_constraint() {
        assert_eq!(
            duplicated_field(Some("_User_unique_email"), None).as_deref(),
            Some("email")
        );
    }

    #[test]
    fn field_from_detail() {
        assert_eq!(
            duplicated_field(
                Some("Post_pkey"),
                Some("Key (\"objectId\")=(abc) already exists.")
            )
            .as_deref(),
            Some("objectId")
        );
        assert_eq!(
            duplicated_field(None, Some("Key (title)=(x) already exists.")).as_deref(),
            Some("title")
        );
    }

    #[test]
    fn no_field() {
        assert_eq!(duplicated_field(Some("Post_pkey"), None), None);
        assert_eq!(Native::of_error(&Error::invalid_query("x")), None);
    }
}
