// DetectionContext: explicit owner of all mutable detection state
//
// Replaces process-wide histories with a value the caller creates and
// passes to every engine call. Dropping the context drops all histories.

use std::sync::{Mutex, MutexGuard};

use crate::analysis::{NoiseModel, StabilityFilter};
use crate::config::AppConfig;
use crate::error::{log_detection_error, DetectionError};
use crate::managers::CalibrationManager;

/// Mutable state shared by calibration and live detection
///
/// Holds:
/// - The per-machine detection histories (stability vote)
/// - The amplitude noise baseline
/// - The single active calibration session
///
/// Every lock is acquired through a helper that maps poisoning to a
/// typed error, so no call panics on a poisoned lock.
pub struct DetectionContext {
    stability: Mutex<StabilityFilter>,
    noise: Mutex<NoiseModel>,
    calibration: CalibrationManager,
}

impl DetectionContext {
    /// Create a context with empty histories and no active session
    pub fn new(config: &AppConfig) -> Self {
        Self {
            stability: Mutex::new(StabilityFilter::new(&config.stability)),
            noise: Mutex::new(NoiseModel::new(&config.noise)),
            calibration: CalibrationManager::new(config.calibration.session_duration_ms),
        }
    }

    pub fn calibration(&self) -> &CalibrationManager {
        &self.calibration
    }

    /// Safely acquire lock on the stability filter
    ///
    /// Live evaluation holds this guard for the whole batch, which
    /// serializes history appends in arrival order.
    pub fn lock_stability(&self) -> Result<MutexGuard<'_, StabilityFilter>, DetectionError> {
        self.stability.lock().map_err(|_| {
            let err = DetectionError::StatePoisoned;
            log_detection_error(&err, "DetectionContext", "lock_stability");
            err
        })
    }

    /// Safely acquire lock on the noise model
    pub fn lock_noise(&self) -> Result<MutexGuard<'_, NoiseModel>, DetectionError> {
        self.noise.lock().map_err(|_| {
            let err = DetectionError::StatePoisoned;
            log_detection_error(&err, "DetectionContext", "lock_noise");
            err
        })
    }

    /// Forget all detection histories and the noise baseline
    ///
    /// The calibration session, if any, is kept.
    pub fn reset_detection(&self) -> Result<(), DetectionError> {
        self.lock_stability()?.reset();
        self.lock_noise()?.reset();
        log::info!("[DetectionContext] Detection state reset");
        Ok(())
    }
}

impl Default for DetectionContext {
    fn default() -> Self {
        Self::new(&AppConfig::default())
    }
}
