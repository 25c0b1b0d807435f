use super::Error;

/// A unique constraint rejected a write.
#[derive(Debug)]
pub(super) struct DuplicateValue {
    pub(super) message: Box<str>,
    pub(super) duplicated_field: Option<Box<str>>,
}

impl std::error::Error for DuplicateValue {}

impl core::fmt::Display for DuplicateValue {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates a duplicate value error.
    pub fn duplicate_value(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::DuplicateValue(DuplicateValue {
            message: message.into().into(),
            duplicated_field: None,
        }))
    }

    /// Creates a duplicate value error naming the field whose unique index was violated.
    pub fn duplicate_value_on(message: impl Into<String>, field: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::DuplicateValue(DuplicateValue {
            message: message.into().into(),
            duplicated_field: Some(field.into().into()),
        }))
    }

    /// Returns `true` if this error is a duplicate value error.
    pub fn is_duplicate_value(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::DuplicateValue(_))
    }

    /// The field extracted from the native duplicate-key message, if any.
    pub fn duplicated_field(&self) -> Option<&str> {
        match self.kind() {
            super::ErrorKind::DuplicateValue(err) => err.duplicated_field.as_deref(),
            _ => None,
        }
    }
}
