/// The error taxonomy shared by every adapter.
///
/// Numeric values match the codes the surrounding engine reports to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalServerError,
    ObjectNotFound,
    InvalidQuery,
    InvalidJson,
    CommandUnavailable,
    OperationForbidden,
    InvalidNestedKey,
    DuplicateValue,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::InternalServerError => 1,
            ErrorCode::ObjectNotFound => 101,
            ErrorCode::InvalidQuery => 102,
            ErrorCode::InvalidJson => 107,
            ErrorCode::CommandUnavailable => 108,
            ErrorCode::OperationForbidden => 119,
            ErrorCode::InvalidNestedKey => 121,
            ErrorCode::DuplicateValue => 137,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::ObjectNotFound => "OBJECT_NOT_FOUND",
            ErrorCode::InvalidQuery => "INVALID_QUERY",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::CommandUnavailable => "COMMAND_UNAVAILABLE",
            ErrorCode::OperationForbidden => "OPERATION_FORBIDDEN",
            ErrorCode::InvalidNestedKey => "INVALID_NESTED_KEY",
            ErrorCode::DuplicateValue => "DUPLICATE_VALUE",
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
