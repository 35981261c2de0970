// Managers Module
//
// Focused managers owned by DetectionContext.
//
// - CalibrationManager: Calibration session lifecycle (single active session)

pub mod calibration_manager;

pub use calibration_manager::CalibrationManager;
