// CalibrationManager: Single active calibration session
//
// Single Responsibility: Calibration session lifecycle
// Holds at most one CalibrationSession behind a mutex, which acts as the
// single-writer calibration lock.

use std::sync::{Mutex, MutexGuard};

use crate::analysis::Peak;
use crate::calibration::{CalibrationProgress, CalibrationSession, FinalizedSession};
use crate::error::{log_calibration_error, CalibrationError};

/// Manages the calibration session lifecycle
///
/// This manager handles:
/// - Starting a session for one machine at a time
/// - Appending calibration frames to the active session
/// - Stopping and finalizing the session
/// - Thread-safe lock management
///
/// # Example
/// ```ignore
/// let manager = CalibrationManager::new(60_000);
/// manager.start("compressor")?;
/// manager.append("compressor", frames)?;
/// let session = manager.stop()?;
/// ```
pub struct CalibrationManager {
    session: Mutex<Option<CalibrationSession>>,
    session_duration_ms: u64,
}

impl CalibrationManager {
    /// Create a manager with no active session
    ///
    /// # Arguments
    /// * `session_duration_ms` - Window applied to every new session
    pub fn new(session_duration_ms: u64) -> Self {
        Self {
            session: Mutex::new(None),
            session_duration_ms,
        }
    }

    /// Start calibrating `machine_id`
    ///
    /// # Errors
    /// - `InvalidMachineId` if the id is blank
    /// - `AlreadyCalibrating` if a session is active; it is left untouched
    /// - `StatePoisoned` on lock poisoning
    pub fn start(&self, machine_id: &str) -> Result<(), CalibrationError> {
        let machine_id = machine_id.trim();
        if machine_id.is_empty() {
            let err = CalibrationError::InvalidMachineId;
            log_calibration_error(&err, "CalibrationManager", "start_calibration");
            return Err(err);
        }

        let mut guard = self.lock_session()?;
        self.check_not_in_progress(&guard)?;

        *guard = Some(CalibrationSession::new(machine_id, self.session_duration_ms));
        log::info!("[CalibrationManager] Calibration started for '{}'", machine_id);
        Ok(())
    }

    /// Append the peaks of calibration frames to the active session
    ///
    /// # Arguments
    /// * `machine_id` - Machine the frames were captured for
    /// * `frames` - `(timestamp_ms, peaks)` per frame, in arrival order
    ///
    /// # Errors
    /// - `NotCalibrating` if no session is active
    /// - `MachineMismatch` if the session belongs to another machine
    /// - `StatePoisoned` on lock poisoning
    pub fn append(
        &self,
        machine_id: &str,
        frames: impl IntoIterator<Item = (u64, Vec<Peak>)>,
    ) -> Result<CalibrationProgress, CalibrationError> {
        let mut guard = self.lock_session()?;
        let session = guard.as_mut().ok_or_else(|| {
            let err = CalibrationError::NotCalibrating;
            log_calibration_error(&err, "CalibrationManager", "append_calibration");
            err
        })?;

        if session.machine_id() != machine_id.trim() {
            let err = CalibrationError::MachineMismatch {
                active: session.machine_id().to_string(),
                received: machine_id.to_string(),
            };
            log_calibration_error(&err, "CalibrationManager", "append_calibration");
            return Err(err);
        }

        let was_elapsed = session.is_window_elapsed();
        for (timestamp_ms, peaks) in frames {
            session.append(timestamp_ms, peaks);
        }
        if session.is_window_elapsed() && !was_elapsed {
            log::info!(
                "[CalibrationManager] Session window elapsed for '{}' after {} frames",
                session.machine_id(),
                session.frame_count()
            );
        }

        Ok(session.progress())
    }

    /// Stop the active session and hand it over for profile building
    ///
    /// # Errors
    /// - `NotCalibrating` if no session is active
    /// - `StatePoisoned` on lock poisoning
    pub fn stop(&self) -> Result<FinalizedSession, CalibrationError> {
        let mut guard = self.lock_session()?;
        match guard.take() {
            Some(session) => {
                log::info!(
                    "[CalibrationManager] Calibration stopped for '{}' ({} frames)",
                    session.machine_id(),
                    session.frame_count()
                );
                Ok(session.finalize())
            }
            None => {
                let err = CalibrationError::NotCalibrating;
                log_calibration_error(&err, "CalibrationManager", "stop_calibration");
                Err(err)
            }
        }
    }

    /// Machine currently being calibrated, if any
    pub fn active_machine(&self) -> Result<Option<String>, CalibrationError> {
        Ok(self
            .lock_session()?
            .as_ref()
            .map(|s| s.machine_id().to_string()))
    }

    /// Progress of the active session, if any
    pub fn progress(&self) -> Result<Option<CalibrationProgress>, CalibrationError> {
        Ok(self.lock_session()?.as_ref().map(CalibrationSession::progress))
    }

    // ========================================================================
    // HELPER METHODS - Lock management and validation
    // ========================================================================

    /// Safely acquire lock on the session slot
    fn lock_session(&self) -> Result<MutexGuard<'_, Option<CalibrationSession>>, CalibrationError> {
        self.session.lock().map_err(|_| {
            let err = CalibrationError::StatePoisoned;
            log_calibration_error(&err, "CalibrationManager", "lock_session");
            err
        })
    }

    /// Check that calibration is not already in progress
    fn check_not_in_progress(
        &self,
        guard: &MutexGuard<'_, Option<CalibrationSession>>,
    ) -> Result<(), CalibrationError> {
        if let Some(active) = guard.as_ref() {
            let err = CalibrationError::AlreadyCalibrating {
                machine_id: active.machine_id().to_string(),
            };
            log_calibration_error(&err, "CalibrationManager", "start_calibration");
            return Err(err);
        }
        Ok(())
    }
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new(60_000)
    }
}
