// Detection error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Detection error code constants
///
/// Error code range: 3001-3005
pub struct DetectionErrorCodes;

impl DetectionErrorCodes {
    /// Batch payload failed validation
    pub const MALFORMED_BATCH: i32 = 3001;

    /// Batch mode tag was not recognized
    pub const UNKNOWN_MODE: i32 = 3002;

    /// Ingestion queue is at capacity
    pub const QUEUE_FULL: i32 = 3003;

    /// Ingestion worker has shut down
    pub const WORKER_STOPPED: i32 = 3004;

    /// Detection history lock was poisoned
    pub const STATE_POISONED: i32 = 3005;
}

/// Log a detection error with structured context
pub fn log_detection_error(err: &DetectionError, component: &str, context: &str) {
    error!("{}", describe_detection_error(err, component, context));
}

fn describe_detection_error(err: &DetectionError, component: &str, context: &str) -> String {
    format!(
        "Detection error in {}: code={}, component={}, message={}",
        context,
        err.code(),
        component,
        err.message()
    )
}

/// Detection-related errors
///
/// These errors cover the live path: payload validation at the ingestion
/// boundary, queue back-pressure and shared history state.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// Payload could not be converted into a typed batch
    MalformedBatch { reason: String },

    /// Mode tag other than `calibration` or `live`
    UnknownMode { mode: String },

    /// Bounded ingestion queue is full
    QueueFull,

    /// Worker task is no longer receiving batches
    WorkerStopped,

    /// Detection history lock was poisoned
    StatePoisoned,
}

impl ErrorCode for DetectionError {
    fn code(&self) -> i32 {
        match self {
            DetectionError::MalformedBatch { .. } => DetectionErrorCodes::MALFORMED_BATCH,
            DetectionError::UnknownMode { .. } => DetectionErrorCodes::UNKNOWN_MODE,
            DetectionError::QueueFull => DetectionErrorCodes::QUEUE_FULL,
            DetectionError::WorkerStopped => DetectionErrorCodes::WORKER_STOPPED,
            DetectionError::StatePoisoned => DetectionErrorCodes::STATE_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            DetectionError::MalformedBatch { reason } => format!("Malformed batch: {}", reason),
            DetectionError::UnknownMode { mode } => format!("Unknown batch mode '{}'", mode),
            DetectionError::QueueFull => "Ingestion queue full, batch persisted".to_string(),
            DetectionError::WorkerStopped => "Ingestion worker stopped".to_string(),
            DetectionError::StatePoisoned => "Detection history lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DetectionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for DetectionError {}
