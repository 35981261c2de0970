// Analysis module - spectral pipeline for machine identification
//
// This module holds the per-frame and per-batch stages that run on every
// ingested batch. They are pure transformations apart from the stability
// filter and noise model, whose state lives in `DetectionContext`.
//
// Architecture:
// - Pipeline: SpectralFrame → PeakExtractor → MachineMatcher → StabilityFilter
// - Side channel: frame amplitude → NoiseModel
// - Statistics: percentile helpers shared with profile building

pub mod matcher;
pub mod noise;
pub mod peaks;
pub mod stability;
pub mod statistics;
pub mod types;

pub use matcher::{MachineMatcher, MatchOutcome};
pub use noise::{NoiseModel, NoiseObservation};
pub use peaks::PeakExtractor;
pub use stability::{DetectionHistory, StabilityFilter};
pub use statistics::Quartiles;
pub use types::{Peak, SpectralFrame};
