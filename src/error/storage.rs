// Profile storage error types

use crate::error::ErrorCode;
use std::fmt;

/// Storage error code constants
///
/// Error code range: 4001-4003
pub struct StorageErrorCodes;

impl StorageErrorCodes {
    pub const IO: i32 = 4001;
    pub const SERIALIZATION: i32 = 4002;
    pub const LOCK_POISONED: i32 = 4003;
}

/// Errors raised by `ProfileStore` implementations
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    Io { details: String },

    /// Stored document could not be encoded or decoded
    Serialization { details: String },

    /// In-memory map lock was poisoned
    LockPoisoned,
}

impl ErrorCode for StorageError {
    fn code(&self) -> i32 {
        match self {
            StorageError::Io { .. } => StorageErrorCodes::IO,
            StorageError::Serialization { .. } => StorageErrorCodes::SERIALIZATION,
            StorageError::LockPoisoned => StorageErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            StorageError::Io { details } => format!("Profile store I/O error: {}", details),
            StorageError::Serialization { details } => {
                format!("Profile store serialization error: {}", details)
            }
            StorageError::LockPoisoned => "Profile store lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StorageError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read only");
        let err: StorageError = io_err.into();

        match err {
            StorageError::Io { details } => assert!(details.contains("read only")),
            other => panic!("Expected Io variant, got {:?}", other),
        }
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StorageError = parse_err.into();
        assert_eq!(err.code(), StorageErrorCodes::SERIALIZATION);
    }
}
