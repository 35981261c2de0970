//! Configuration management for detection tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! so thresholds for peak picking, profile acceptance, matching and the
//! stability vote can be adjusted per installation without recompiling.
//! Every section has a `Default`, and missing fields fall back to it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub peak_extraction: PeakExtractionConfig,
    pub calibration: CalibrationConfig,
    pub matching: MatchingConfig,
    pub stability: StabilityConfig,
    pub noise: NoiseConfig,
    pub ingestion: IngestionConfig,
}

/// How the peak detection threshold is derived for each frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Fixed magnitude floor, independent of the frame
    Absolute { floor: f32 },
    /// Fraction of the current frame's maximum magnitude
    Relative { fraction: f32 },
}

impl ThresholdMode {
    /// Resolve the magnitude threshold for a frame whose maximum is `frame_max`
    pub fn resolve(&self, frame_max: f32) -> f32 {
        match *self {
            ThresholdMode::Absolute { floor } => floor,
            ThresholdMode::Relative { fraction } => frame_max * fraction,
        }
    }
}

/// Spectral peak extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakExtractionConfig {
    /// Maximum number of peaks kept per frame
    pub max_peaks: usize,
    /// Minimum distance between accepted peaks, in bins
    pub min_bin_separation: usize,
    /// Detection threshold mode
    pub threshold: ThresholdMode,
    /// Frames reporting a time-domain amplitude below this are skipped
    pub min_frame_amplitude: f32,
}

impl Default for PeakExtractionConfig {
    fn default() -> Self {
        Self {
            max_peaks: 5,
            min_bin_separation: 5,
            // Relative thresholding survives browser-side gain/compression
            threshold: ThresholdMode::Relative { fraction: 0.1 },
            min_frame_amplitude: 0.02,
        }
    }
}

/// Calibration session and profile construction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Minimum frames with a dominant peak required to build a profile
    pub min_frames: usize,
    /// Maximum accepted IQR of dominant frequencies, in Hz (inclusive)
    pub max_allowed_spread: f32,
    /// Session window measured on frame timestamps, in ms
    pub session_duration_ms: u64,
    /// Minimum half-width of detection bounds around the median, in Hz
    pub min_half_width: f32,
    /// Harmonic band clustering
    pub bands: BandConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_frames: 10,
            max_allowed_spread: 80.0,
            session_duration_ms: 60_000,
            min_half_width: 1.0,
            bands: BandConfig::default(),
        }
    }
}

/// Harmonic band clustering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    /// Bucket width used to group peak frequencies, in Hz
    pub bucket_width: f32,
    /// Buckets with fewer samples than this are discarded
    pub min_samples: usize,
    /// Maximum number of bands kept per profile
    pub max_bands: usize,
    /// Peaks below this normalized amplitude are ignored
    pub min_amplitude: f32,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            bucket_width: 15.0,
            min_samples: 15,
            max_bands: 5,
            min_amplitude: 0.1,
        }
    }
}

/// Live matching parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Peaks below this normalized amplitude never match
    pub min_peak_amplitude: f32,
    /// Inner edge of the near-miss zone outside a profile's bounds, in Hz
    pub near_miss_min: f32,
    /// Outer edge of the near-miss zone outside a profile's bounds, in Hz
    pub near_miss_max: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_peak_amplitude: 0.15,
            near_miss_min: 5.0,
            near_miss_max: 10.0,
        }
    }
}

/// Temporal stability vote parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Ring buffer capacity per machine, in batches
    pub window: usize,
    /// Detection rate required to report a machine as running
    pub threshold: f32,
    /// Observations required before any verdict (1 = pure fill-as-you-go)
    pub min_observations: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            window: 15,
            threshold: 0.6,
            min_observations: 1,
        }
    }
}

/// EWMA amplitude anomaly model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub alpha: f64,
    pub z_threshold: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            alpha: 0.02,
            z_threshold: 3.0,
        }
    }
}

/// Async ingestion worker parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Bounded queue capacity between `submit` and the worker
    pub queue_capacity: usize,
    /// Broadcast buffer for verdict subscribers
    pub broadcast_capacity: usize,
    /// Where rejected or failed batches are dumped as JSON
    pub failed_batch_dir: String,
    /// JSONL file receiving every processed frame with peaks; unset disables it
    pub frame_log_path: Option<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            broadcast_capacity: 100,
            failed_batch_dir: "data/failed_batches".to_string(),
            frame_log_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        Self::load_from_file("assets/machine_config.json")
    }
}
