use super::Error;

/// A nested object key contains `$` or `.`.
#[derive(Debug)]
pub(super) struct InvalidNestedKey {
    pub(super) message: Box<str>,
}

impl std::error::Error for InvalidNestedKey {}

impl core::fmt::Display for InvalidNestedKey {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates an invalid nested key error.
    pub fn invalid_nested_key(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InvalidNestedKey(InvalidNestedKey {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid nested key error.
    pub fn is_invalid_nested_key(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InvalidNestedKey(_))
    }
}
