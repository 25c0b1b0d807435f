use super::Error;

/// A backend failure that is reported without its native detail.
#[derive(Debug)]
pub(super) struct InternalServerError {
    pub(super) message: Box<str>,
}

impl std::error::Error for InternalServerError {}

impl core::fmt::Display for InternalServerError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates an internal server error.
    pub fn internal_server_error(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InternalServerError(InternalServerError {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an internal server error.
    pub fn is_internal_server_error(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InternalServerError(_))
    }
}
