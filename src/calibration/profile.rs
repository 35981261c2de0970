// ProfileBuilder - statistical machine signature from a calibration session
//
// The dominant peak of every frame that has one is summarized by its
// quartiles. The interquartile range decides whether the machine is tonal
// enough to be recognized later; accepted profiles carry detection bounds
// half an IQR outside the quartiles, never narrower than `min_half_width`
// around the median.

use serde::{Deserialize, Serialize};

use super::bands::{cluster_bands, HarmonicBand};
use super::session::FinalizedSession;
use crate::analysis::statistics::{sorted_finite, Quartiles};
use crate::config::CalibrationConfig;
use crate::error::CalibrationError;

/// Learned signature of one machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineProfile {
    /// Unique key
    pub machine_id: String,
    /// Median dominant frequency, in Hz
    pub median_frequency: f32,
    /// Lower detection bound, in Hz
    pub iqr_low: f32,
    /// Upper detection bound, in Hz
    pub iqr_high: f32,
    /// Recurring bands seen during calibration (diagnostic only)
    #[serde(default)]
    pub harmonic_bands: Vec<HarmonicBand>,
    /// Number of dominant-peak samples the profile was built from
    pub sample_count: usize,
    /// Timestamp of the last calibration frame, in ms
    pub updated_at_ms: u64,
}

impl MachineProfile {
    /// Inclusive range test against the detection bounds
    pub fn contains(&self, frequency: f32) -> bool {
        self.iqr_low <= frequency && frequency <= self.iqr_high
    }

    /// Width of the detection range, in Hz
    pub fn bandwidth(&self) -> f32 {
        self.iqr_high - self.iqr_low
    }
}

/// Builds profiles from finalized sessions
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    config: CalibrationConfig,
}

impl ProfileBuilder {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    /// Build a profile from a finalized session
    ///
    /// Pure and deterministic: identical sessions give identical profiles.
    ///
    /// # Errors
    /// * `InvalidMachineId` - session machine id is blank
    /// * `InsufficientFrames` - fewer than `min_frames` frames had a peak
    /// * `ProfileRejected` - IQR of dominant frequencies exceeds the limit
    pub fn build(&self, session: &FinalizedSession) -> Result<MachineProfile, CalibrationError> {
        if session.machine_id().trim().is_empty() {
            return Err(CalibrationError::InvalidMachineId);
        }

        let dominant: Vec<f32> = session
            .frames()
            .iter()
            .filter_map(|peaks| peaks.first())
            .map(|peak| peak.frequency)
            .collect();
        let sorted = sorted_finite(&dominant);

        if sorted.len() < self.config.min_frames.max(1) {
            return Err(CalibrationError::InsufficientFrames {
                required: self.config.min_frames.max(1),
                collected: sorted.len(),
            });
        }

        let quartiles =
            Quartiles::from_sorted(&sorted).ok_or(CalibrationError::InsufficientFrames {
                required: self.config.min_frames.max(1),
                collected: 0,
            })?;
        let iqr = quartiles.iqr();

        if iqr > self.config.max_allowed_spread {
            return Err(CalibrationError::ProfileRejected {
                iqr,
                max_allowed: self.config.max_allowed_spread,
            });
        }

        let half_width = self.config.min_half_width.max(f32::EPSILON);
        let iqr_low = (quartiles.q1 - 0.5 * iqr)
            .min(quartiles.median - half_width)
            .max(0.0);
        let iqr_high = (quartiles.q3 + 0.5 * iqr).max(quartiles.median + half_width);

        let harmonic_bands = cluster_bands(session.frames(), &self.config.bands);

        log::info!(
            "[ProfileBuilder] Built profile '{}': median={:.1} Hz, bounds=[{:.1}, {:.1}], iqr={:.1}, samples={}, bands={}",
            session.machine_id(),
            quartiles.median,
            iqr_low,
            iqr_high,
            iqr,
            sorted.len(),
            harmonic_bands.len()
        );

        Ok(MachineProfile {
            machine_id: session.machine_id().to_string(),
            median_frequency: quartiles.median,
            iqr_low,
            iqr_high,
            harmonic_bands,
            sample_count: sorted.len(),
            updated_at_ms: session.ended_at_ms(),
        })
    }
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}
