//! Client-side failure taxonomy and exit codes

use thiserror::Error;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, DNS failure or timeout
    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("integrity mismatch for {name}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Rejected locally, nothing was sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected status or malformed response
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Failure category, each with a stable process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidRequest,
    Unreachable,
    PackageNotFound,
    IntegrityMismatch,
    Protocol,
    Io,
}

impl FailureKind {
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::InvalidRequest => 2,
            FailureKind::Unreachable => 3,
            FailureKind::PackageNotFound => 4,
            FailureKind::IntegrityMismatch => 5,
            FailureKind::Protocol => 6,
            FailureKind::Io => 7,
        }
    }
}

impl ClientError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::Unreachable(_) => FailureKind::Unreachable,
            ClientError::PackageNotFound(_) => FailureKind::PackageNotFound,
            ClientError::IntegrityMismatch { .. } => FailureKind::IntegrityMismatch,
            ClientError::InvalidRequest(_) => FailureKind::InvalidRequest,
            ClientError::Protocol(_) => FailureKind::Protocol,
            ClientError::Io(_) => FailureKind::Io,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Protocol(err.to_string())
        } else {
            ClientError::Unreachable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exit_codes_distinct() {
        let kinds = [
            FailureKind::InvalidRequest,
            FailureKind::Unreachable,
            FailureKind::PackageNotFound,
            FailureKind::IntegrityMismatch,
            FailureKind::Protocol,
            FailureKind::Io,
        ];
        let codes: HashSet<i32> = kinds.iter().map(|k| k.exit_code()).collect();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_error_kind() {
        let err = ClientError::IntegrityMismatch {
            name: "tool.zip".to_string(),
            expected: "a".repeat(40),
            actual: "b".repeat(40),
        };
        assert_eq!(err.kind(), FailureKind::IntegrityMismatch);
        assert_eq!(err.exit_code(), 5);
        assert_eq!(ClientError::PackageNotFound("x".into()).exit_code(), 4);
    }
}
