use super::Error;

/// The compiler has no translation for a constraint or update shape.
#[derive(Debug)]
pub(super) struct OperationForbidden {
    pub(super) message: Box<str>,
}

impl std::error::Error for OperationForbidden {}

impl core::fmt::Display for OperationForbidden {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates an operation forbidden error.
    pub fn operation_forbidden(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::OperationForbidden(OperationForbidden {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an operation forbidden error.
    pub fn is_operation_forbidden(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::OperationForbidden(_))
    }
}
