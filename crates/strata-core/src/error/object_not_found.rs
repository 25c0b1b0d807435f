use super::Error;

/// The targeted class or object does not exist.
#[derive(Debug)]
pub(super) struct ObjectNotFound {
    pub(super) message: Box<str>,
}

impl std::error::Error for ObjectNotFound {}

impl core::fmt::Display for ObjectNotFound {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates an object not found error.
    pub fn object_not_found(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::ObjectNotFound(ObjectNotFound {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an object not found error.
    pub fn is_object_not_found(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::ObjectNotFound(_))
    }
}
