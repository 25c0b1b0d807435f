use super::Error;

/// The request is well-formed JSON but asks for something the adapter refuses:
/// a conflicting index, an unknown field, an unsupported read preference.
#[derive(Debug)]
pub(super) struct InvalidQuery {
    pub(super) message: Box<str>,
}

impl std::error::Error for InvalidQuery {}

impl core::fmt::Display for InvalidQuery {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InvalidQuery(InvalidQuery {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid query error.
    pub fn is_invalid_query(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InvalidQuery(_))
    }
}
