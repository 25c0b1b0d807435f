mod adhoc;
mod code;
mod command_unavailable;
mod driver;
mod duplicate_value;
mod internal_server_error;
mod invalid_json;
mod invalid_nested_key;
mod invalid_query;
mod object_not_found;
mod operation_forbidden;

pub use code::ErrorCode;

use adhoc::AdhocError;
use command_unavailable::CommandUnavailable;
use driver::DriverError;
use duplicate_value::DuplicateValue;
use internal_server_error::InternalServerError;
use invalid_json::InvalidJson;
use invalid_nested_key::InvalidNestedKey;
use invalid_query::InvalidQuery;
use object_not_found::ObjectNotFound;
use operation_forbidden::OperationForbidden;
use std::sync::Arc;

/// Returns early with an ad-hoc error built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::from_args(format_args!($($arg)*)))
    };
}

/// Builds an ad-hoc error from a format string.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        $crate::Error::from_args(format_args!($($arg)*))
    };
}

/// An error raised by a storage adapter or one of its compilers.
///
/// Errors carrying a taxonomy kind (duplicate value, invalid query, ...) report
/// it through [`Error::code`]. Native driver failures that no rule classified
/// are preserved verbatim and report no code.
#[derive(Clone)]
pub struct Error {
    inner: Option<Arc<ErrorInner>>,
}

#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    cause: Option<Error>,
}

impl Error {
    /// Adds context to this error.
    ///
    /// Context is displayed in reverse order: the most recently added context is shown first,
    /// followed by earlier context, ending with the root cause.
    #[inline(always)]
    pub fn context(self, consequent: impl IntoError) -> Error {
        self.context_impl(consequent.into_error())
    }

    #[inline(never)]
    #[cold]
    fn context_impl(self, consequent: Error) -> Error {
        let kind = match consequent.inner {
            Some(inner) => match Arc::try_unwrap(inner) {
                Ok(inner) => inner.kind,
                // A shared consequent cannot be moved out of; keep its message instead.
                Err(shared) => ErrorKind::Adhoc(AdhocError::new(shared.kind.to_string())),
            },
            None => ErrorKind::Unknown,
        };

        Error {
            inner: Some(Arc::new(ErrorInner {
                kind,
                cause: Some(self),
            })),
        }
    }

    /// Returns the taxonomy code of the first classified error in the chain.
    pub fn code(&self) -> Option<ErrorCode> {
        self.chain().find_map(|err| err.kind().code())
    }

    /// Returns `true` if the error (or any error it wraps) carries `code`.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code() == Some(code)
    }

    fn chain(&self) -> impl Iterator<Item = &Error> {
        let mut err = self;
        core::iter::once(err).chain(core::iter::from_fn(move || {
            err = err.inner.as_ref().and_then(|inner| inner.cause.as_ref())?;
            Some(err)
        }))
    }

    fn kind(&self) -> &ErrorKind {
        self.inner
            .as_ref()
            .map(|inner| &inner.kind)
            .unwrap_or(&ErrorKind::Unknown)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind() {
            ErrorKind::Driver(err) => Some(err),
            ErrorKind::Anyhow(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut it = self.chain().peekable();
        while let Some(err) = it.next() {
            core::fmt::Display::fmt(err.kind(), f)?;
            if it.peek().is_some() {
                f.write_str(": ")?;
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if !f.alternate() {
            core::fmt::Display::fmt(self, f)
        } else {
            let Some(ref inner) = self.inner else {
                return f.debug_struct("Error").field("kind", &"None").finish();
            };
            f.debug_struct("Error")
                .field("kind", &inner.kind)
                .field("cause", &inner.cause)
                .finish()
        }
    }
}

#[derive(Debug)]
enum ErrorKind {
    Anyhow(anyhow::Error),
    Adhoc(AdhocError),
    Driver(DriverError),
    DuplicateValue(DuplicateValue),
    InvalidQuery(InvalidQuery),
    InvalidJson(InvalidJson),
    ObjectNotFound(ObjectNotFound),
    InternalServerError(InternalServerError),
    OperationForbidden(OperationForbidden),
    InvalidNestedKey(InvalidNestedKey),
    CommandUnavailable(CommandUnavailable),
    Unknown,
}

impl ErrorKind {
    fn code(&self) -> Option<ErrorCode> {
        use self::ErrorKind::*;

        Some(match self {
            DuplicateValue(_) => ErrorCode::DuplicateValue,
            InvalidQuery(_) => ErrorCode::InvalidQuery,
            InvalidJson(_) => ErrorCode::InvalidJson,
            ObjectNotFound(_) => ErrorCode::ObjectNotFound,
            InternalServerError(_) => ErrorCode::InternalServerError,
            OperationForbidden(_) => ErrorCode::OperationForbidden,
            InvalidNestedKey(_) => ErrorCode::InvalidNestedKey,
            CommandUnavailable(_) => ErrorCode::CommandUnavailable,
            Anyhow(_) | Adhoc(_) | Driver(_) | Unknown => return None,
        })
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        use self::ErrorKind::*;

        match self {
            Anyhow(err) => core::fmt::Display::fmt(err, f),
            Adhoc(err) => core::fmt::Display::fmt(err, f),
            Driver(err) => core::fmt::Display::fmt(err, f),
            DuplicateValue(err) => core::fmt::Display::fmt(err, f),
            InvalidQuery(err) => core::fmt::Display::fmt(err, f),
            InvalidJson(err) => core::fmt::Display::fmt(err, f),
            ObjectNotFound(err) => core::fmt::Display::fmt(err, f),
            InternalServerError(err) => core::fmt::Display::fmt(err, f),
            OperationForbidden(err) => core::fmt::Display::fmt(err, f),
            InvalidNestedKey(err) => core::fmt::Display::fmt(err, f),
            CommandUnavailable(err) => core::fmt::Display::fmt(err, f),
            Unknown => f.write_str("unknown strata error"),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Some(Arc::new(ErrorInner { kind, cause: None })),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error::from(ErrorKind::Anyhow(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::from(anyhow::Error::from(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::invalid_json(err.to_string())
    }
}

/// Trait for types that can be converted into an Error.
pub trait IntoError {
    /// Converts this type into an Error.
    fn into_error(self) -> Error;
}

impl IntoError for Error {
    #[inline(always)]
    fn into_error(self) -> Error {
        self
    }
}

impl IntoError for &str {
    fn into_error(self) -> Error {
        Error::from_args(format_args!("{self}"))
    }
}
