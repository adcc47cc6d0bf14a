//! Core error taxonomy.
//!
//! Every error that crosses the core boundary is one of five kinds, each
//! aligned with an HTTP status code. Validation failures are detected before
//! any side effect, and evaluator errors propagate to the caller unchanged.

use thiserror::Error;

/// Errors returned by the search core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed parameters, bad sort/filter/geo syntax, schema mismatches.
    #[error("{0}")]
    InvalidArgument(String),

    /// Duplicate key value or duplicate id under create-only semantics.
    #[error("{0}")]
    Conflict(String),

    /// Authentication failure, scoped-key misuse, or expiry.
    #[error("{0}")]
    Forbidden(String),

    /// Unknown collection or id.
    #[error("{0}")]
    NotFound(String),

    /// Store or hash failures.
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code this error maps to on the wire.
    pub fn http_code(&self) -> u16 {
        match self {
            Error::InvalidArgument(_) => 400,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Internal(_) => 500,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn forbidden() -> Self {
        Error::Forbidden("Forbidden.".to_string())
    }

    pub fn not_found() -> Self {
        Error::NotFound("Not found.".to_string())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

/// Convenience result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_codes() {
        assert_eq!(Error::invalid("x").http_code(), 400);
        assert_eq!(Error::forbidden().http_code(), 403);
        assert_eq!(Error::not_found().http_code(), 404);
        assert_eq!(Error::conflict("x").http_code(), 409);
        assert_eq!(Error::internal("x").http_code(), 500);
    }

    #[test]
    fn test_message_passthrough() {
        let err = Error::invalid("Only upto 3 sort_by fields can be specified.");
        assert_eq!(
            err.to_string(),
            "Only upto 3 sort_by fields can be specified."
        );
    }
}
