// Calibration module - learning machine signatures
//
// This module provides three components:
// 1. CalibrationSession: Collects per-frame peaks for one machine
// 2. ProfileBuilder: Turns a finalized session into a MachineProfile
// 3. Harmonic band clustering stored alongside each profile
//
// The calibration workflow:
// 1. Start a CalibrationSession for a machine id
// 2. Append the peaks of every calibration frame
// 3. Finalize the session and build the profile, which is then upserted

pub mod bands;
pub mod profile;
pub mod session;

pub use bands::HarmonicBand;
pub use profile::{MachineProfile, ProfileBuilder};
pub use session::{CalibrationProgress, CalibrationSession, FinalizedSession, SessionAppend};
