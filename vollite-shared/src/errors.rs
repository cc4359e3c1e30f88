//! Error types for volume operations.
//!
//! Every variant carries a human-readable context string naming the
//! volume, path and operation involved.

use std::io;

use thiserror::Error;

/// Errors that can occur while managing volumes.
#[derive(Debug, Error)]
pub enum VolliteError {
    /// Referenced file, volume or pool does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Volume was defined twice without an intervening erase.
    #[error("already defined: {0}")]
    AlreadyDefined(String),

    /// Query or child creation on a volume that is not defined.
    #[error("not defined: {0}")]
    NotDefined(String),

    /// Resize or upload primitive failed.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Declared parameters are missing, conflicting or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Storage backend or filesystem failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used across the workspace.
pub type VolliteResult<T> = Result<T, VolliteError>;

impl VolliteError {
    /// Wrap an IO error, keeping `NotFound` distinguishable from other failures.
    pub fn from_io(context: impl std::fmt::Display, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(format!("{}: {}", context, err)),
            _ => Self::Storage(format!("{}: {}", context, err)),
        }
    }

    /// Check whether this error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_not_found() {
        let err = VolliteError::from_io(
            "stat /tmp/admin.iso",
            io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        );
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "not found: stat /tmp/admin.iso: No such file or directory"
        );
    }

    #[test]
    fn test_from_io_other() {
        let err = VolliteError::from_io(
            "write /pool/vol",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, VolliteError::Storage(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = VolliteError::Transfer("resize test_volume to 6442000000 bytes".into());
        assert_eq!(
            err.to_string(),
            "transfer failed: resize test_volume to 6442000000 bytes"
        );
    }
}
