use super::Error;

/// A constraint or value has the wrong shape (bad `$in` operand, malformed
/// polygon, out-of-range coordinates, unknown `$` operator).
#[derive(Debug)]
pub(super) struct InvalidJson {
    pub(super) message: Box<str>,
}

impl std::error::Error for InvalidJson {}

impl core::fmt::Display for InvalidJson {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InvalidJson(InvalidJson {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid JSON error.
    pub fn is_invalid_json(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InvalidJson(_))
    }
}
