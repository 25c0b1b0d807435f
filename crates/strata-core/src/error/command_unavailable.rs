use super::Error;

/// The backend does not support the requested operator.
#[derive(Debug)]
pub(super) struct CommandUnavailable {
    pub(super) message: Box<str>,
}

impl std::error::Error for CommandUnavailable {}

impl core::fmt::Display for CommandUnavailable {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates a command unavailable error.
    pub fn command_unavailable(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::CommandUnavailable(CommandUnavailable {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a command unavailable error.
    pub fn is_command_unavailable(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::CommandUnavailable(_))
    }
}
