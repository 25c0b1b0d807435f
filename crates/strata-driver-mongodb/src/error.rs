use mongodb::error::{ErrorKind, WriteFailure};
use regex::Regex;
use std::sync::LazyLock;
use strata_core::Error;

/// Message reported for every unique-index violation.
const DUPLICATE_VALUE: &str = "A duplicate value for a field with unique values was provided";

/// `index: username_1 dup key ..`, or the older `index: db.Class.$username_1 dup key ..`.
static DUPLICATE_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"index:\s+(?:\S*\$)?([a-zA-Z_-]+)_1").unwrap());

/// The server failures the adapter reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Native {
    /// `11000`, or the legacy `11001`.
    DuplicateKey,
    /// `26`, e.g. dropping a collection that does not exist.
    NamespaceNotFound,
    /// `48`, creating a collection that already exists.
    NamespaceExists,
    /// `85`, an index over the same keys exists under another name or options.
    IndexOptionsConflict,
    /// `86`, an index of the same name exists over other keys.
    IndexKeySpecsConflict,
    /// `13`
    Unauthorized,
}

impl Native {
    pub(crate) fn from_code(code: i32) -> Option<Native> {
        Some(match code {
            11000 | 11001 => Native::DuplicateKey,
            26 => Native::NamespaceNotFound,
            48 => Native::NamespaceExists,
            85 => Native::IndexOptionsConflict,
            86 => Native::IndexKeySpecsConflict,
            13 => Native::Unauthorized,
            _ => return None,
        })
    }

    /// Classifies a driver error by its server code.
    pub(crate) fn of(err: &mongodb::error::Error) -> Option<Native> {
        server_failure(err).and_then(|(code, _)| Native::from_code(code))
    }

    /// Finds the server failure wrapped by an adapter error, if any.
    pub(crate) fn of_error(err: &Error) -> Option<Native> {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(err) = source {
            if let Some(err) = err.downcast_ref::<mongodb::error::Error>() {
                return Native::of(err);
            }
            source = err.source();
        }
        None
    }
}

/// The server code and message of a command or write failure.
fn server_failure(err: &mongodb::error::Error) -> Option<(i32, &str)> {
    match err.kind.as_ref() {
        ErrorKind::Command(err) => Some((err.code, err.message.as_str())),
        ErrorKind::Write(WriteFailure::WriteError(err)) => Some((err.code, err.message.as_str())),
        ErrorKind::Write(WriteFailure::WriteConcernError(err)) => {
            Some((err.code, err.message.as_str()))
        }
        _ => None,
    }
}

/// Maps a driver error onto the taxonomy. Only duplicate keys carry a code;
/// everything else is preserved verbatim.
pub(crate) fn map_error(err: mongodb::error::Error) -> Error {
    match server_failure(&err) {
        Some((code, message)) => match Native::from_code(code) {
            Some(Native::DuplicateKey) => match duplicated_field(message) {
                Some(field) => Error::duplicate_value_on(DUPLICATE_VALUE, field),
                None => Error::duplicate_value(DUPLICATE_VALUE),
            },
            Some(Native::Unauthorized) => {
                tracing::error!(%message, "received unauthorized error");
                Error::driver(err)
            }
            _ => Error::driver(err),
        },
        None => Error::driver(err),
    }
}

/// The field a duplicate-key message names through its index.
pub(crate) fn duplicated_field(message: &str) -> Option<String> {
    DUPLICATE_INDEX
        .captures(message)
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
        assert_eq!(Native::from_code(11000), Some(Native::DuplicateKey));
        assert_eq!(Native::from_code(11001), Some(Native::DuplicateKey));
        assert_eq!(Native::from_code(26), Some(Native::NamespaceNotFound));
        assert_eq!(Native::from_code(86), Some(Native::IndexKeySpecsConflict));
        assert_eq!(Native::from_code(2), None);
    }

    #[test]
    fn field_from_index_name() {
        assert_eq!(
            duplicated_field(
                "E11000 duplicate key error collection: test._User index: username_1 dup key: { username: \"a\" }"
            )
            .as_deref(),
            Some("username")
        );
    }

    #[test]
    fn field_from_legacy_message() {
        assert_eq!(
            duplicated_field("E11000 duplicate key error index: test._User.$email_1 dup key: { : \"a\" }")
                .as_deref(),
            Some("email")
        );
    }

    #[test]
    fn no_index_in_message() {
        assert_eq!(duplicated_field("E11000 duplicate key error"), None);
    }
}
