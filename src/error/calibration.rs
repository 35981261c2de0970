// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// Single source of truth for codes shared with callers outside the crate.
///
/// Error code range: 2001-2008
pub struct CalibrationErrorCodes;

impl CalibrationErrorCodes {
    /// Too few usable frames in the finalized session
    pub const INSUFFICIENT_FRAMES: i32 = 2001;

    /// Dominant-frequency spread exceeded the allowed IQR
    pub const PROFILE_REJECTED: i32 = 2002;

    /// Another calibration session is already active
    pub const ALREADY_CALIBRATING: i32 = 2003;

    /// No calibration session is active
    pub const NOT_CALIBRATING: i32 = 2004;

    /// Calibration frames arrived for a different machine
    pub const MACHINE_MISMATCH: i32 = 2005;

    /// Machine id was empty or whitespace
    pub const INVALID_MACHINE_ID: i32 = 2006;

    /// Calibration session lock was poisoned
    pub const STATE_POISONED: i32 = 2007;

    /// Profile could not be written to the store
    pub const STORAGE: i32 = 2008;
}

/// Log a calibration error with structured context
///
/// This function logs calibration errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_calibration_error(err: &CalibrationError, component: &str, context: &str) {
    error!("{}", describe_calibration_error(err, component, context));
}

fn describe_calibration_error(err: &CalibrationError, component: &str, context: &str) -> String {
    format!(
        "Calibration error in {}: code={}, component={}, message={}",
        context,
        err.code(),
        component,
        err.message()
    )
}

/// Calibration-related errors
///
/// These errors cover the session lifecycle and profile construction.
/// None of them leave partial state behind: a rejected profile is never
/// stored and an active session is never disturbed by a failed start.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Session holds fewer usable frames than the configured minimum
    InsufficientFrames { required: usize, collected: usize },

    /// Machine was too unstable during calibration
    ProfileRejected { iqr: f32, max_allowed: f32 },

    /// A session is already active for `machine_id`
    AlreadyCalibrating { machine_id: String },

    /// Stop or calibration ingest called with no active session
    NotCalibrating,

    /// Calibration batch targeted a machine other than the active one
    MachineMismatch { active: String, received: String },

    /// Machine id was empty
    InvalidMachineId,

    /// Session lock was poisoned
    StatePoisoned,

    /// Profile store rejected the write
    Storage { reason: String },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InsufficientFrames { .. } => {
                CalibrationErrorCodes::INSUFFICIENT_FRAMES
            }
            CalibrationError::ProfileRejected { .. } => CalibrationErrorCodes::PROFILE_REJECTED,
            CalibrationError::AlreadyCalibrating { .. } => {
                CalibrationErrorCodes::ALREADY_CALIBRATING
            }
            CalibrationError::NotCalibrating => CalibrationErrorCodes::NOT_CALIBRATING,
            CalibrationError::MachineMismatch { .. } => CalibrationErrorCodes::MACHINE_MISMATCH,
            CalibrationError::InvalidMachineId => CalibrationErrorCodes::INVALID_MACHINE_ID,
            CalibrationError::StatePoisoned => CalibrationErrorCodes::STATE_POISONED,
            CalibrationError::Storage { .. } => CalibrationErrorCodes::STORAGE,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::InsufficientFrames {
                required,
                collected,
            } => {
                format!(
                    "Insufficient frames: need {}, got {}. Recalibrate.",
                    required, collected
                )
            }
            CalibrationError::ProfileRejected { iqr, max_allowed } => {
                format!(
                    "Profile rejected: IQR {:.2} Hz exceeds limit {:.2} Hz. Machine too unstable during calibration.",
                    iqr, max_allowed
                )
            }
            CalibrationError::AlreadyCalibrating { machine_id } => {
                format!("Calibration already in progress for '{}'", machine_id)
            }
            CalibrationError::NotCalibrating => "No calibration in progress".to_string(),
            CalibrationError::MachineMismatch { active, received } => {
                format!(
                    "Calibration batch for '{}' but active session is '{}'",
                    received, active
                )
            }
            CalibrationError::InvalidMachineId => "Machine id must not be empty".to_string(),
            CalibrationError::StatePoisoned => "Calibration session lock poisoned".to_string(),
            CalibrationError::Storage { reason } => {
                format!("Failed to store profile: {}", reason)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}
