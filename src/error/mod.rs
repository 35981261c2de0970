// Error types for the machine listener
//
// This module defines custom error types for calibration, detection and
// profile storage, each carrying a stable numeric code so that callers on
// the far side of an IPC or HTTP boundary can branch without string matching.

mod calibration;
mod detection;
mod storage;

use std::fmt;

pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use detection::{log_detection_error, DetectionError, DetectionErrorCodes};
pub use storage::{StorageError, StorageErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// process boundaries.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Any error the identification engine can return
///
/// Wraps the three error families so engine methods can use `?` across
/// calibration, detection and storage calls.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Calibration(CalibrationError),
    Detection(DetectionError),
    Storage(StorageError),
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::Calibration(err) => err.code(),
            EngineError::Detection(err) => err.code(),
            EngineError::Storage(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::Calibration(err) => err.message(),
            EngineError::Detection(err) => err.message(),
            EngineError::Storage(err) => err.message(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Calibration(err) => err.fmt(f),
            EngineError::Detection(err) => err.fmt(f),
            EngineError::Storage(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<CalibrationError> for EngineError {
    fn from(err: CalibrationError) -> Self {
        EngineError::Calibration(err)
    }
}

impl From<DetectionError> for EngineError {
    fn from(err: DetectionError) -> Self {
        EngineError::Detection(err)
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        EngineError::Storage(err)
    }
}
