//! Stable machine-readable error codes shared by every service error.

use model::ModelError;
use model::timestamp::TimestampError;

/// Maps an error variant to a stable `E_*` code for API clients.
pub trait ErrorCode {
    fn error_code(&self) -> &'static str;
}

impl ErrorCode for ModelError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownKind(_) => "E_UNKNOWN_ENTITY_KIND",
            Self::UnknownField { .. } => "E_UNKNOWN_FIELD",
            Self::InvalidValue { .. } => "E_INVALID_VALUE",
        }
    }
}

impl ErrorCode for TimestampError {
    fn error_code(&self) -> &'static str {
        "E_INVALID_TIMESTAMP"
    }
}
