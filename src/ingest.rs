// Ingestion boundary - external batch payloads to typed batches
//
// `BatchPayload` mirrors the JSON the capture side posts. Nothing past this
// module sees an unvalidated payload: `Batch::try_from` checks the mode,
// the machine id and every frame before the engine is involved.

use serde::{Deserialize, Serialize};

use crate::analysis::SpectralFrame;
use crate::error::DetectionError;

/// One frame as posted by the capture side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    pub magnitudes: Vec<f32>,
    pub nyquist: f32,
    pub timestamp_ms: u64,
    /// Time-domain amplitude of the frame, when the capture side reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<f32>,
}

/// Raw batch as posted by the capture side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
    /// "calibration" or "live"; missing means live
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub frames: Vec<FramePayload>,
}

fn default_mode() -> String {
    "live".to_string()
}

impl BatchPayload {
    /// Live batch from frame payloads
    pub fn live(frames: Vec<FramePayload>) -> Self {
        Self {
            mode: default_mode(),
            machine_id: None,
            frames,
        }
    }

    /// Calibration batch for `machine_id` from frame payloads
    pub fn calibration(machine_id: impl Into<String>, frames: Vec<FramePayload>) -> Self {
        Self {
            mode: "calibration".to_string(),
            machine_id: Some(machine_id.into()),
            frames,
        }
    }
}

/// What a batch is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchMode {
    /// Frames feed the active calibration session of `machine_id`
    Calibration { machine_id: String },
    /// Frames are matched against known profiles
    Live,
}

/// Validated batch of spectral frames
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    mode: BatchMode,
    frames: Vec<SpectralFrame>,
}

impl Batch {
    /// Build a batch from already validated frames
    ///
    /// # Errors
    /// `MalformedBatch` if `frames` is empty or a calibration id is blank.
    pub fn new(mode: BatchMode, frames: Vec<SpectralFrame>) -> Result<Self, DetectionError> {
        if frames.is_empty() {
            return Err(DetectionError::MalformedBatch {
                reason: "batch contains no frames".to_string(),
            });
        }
        if let BatchMode::Calibration { machine_id } = &mode {
            if machine_id.trim().is_empty() {
                return Err(DetectionError::MalformedBatch {
                    reason: "calibration batch requires a machine_id".to_string(),
                });
            }
        }
        Ok(Self { mode, frames })
    }

    pub fn mode(&self) -> &BatchMode {
        &self.mode
    }

    pub fn frames(&self) -> &[SpectralFrame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn into_parts(self) -> (BatchMode, Vec<SpectralFrame>) {
        (self.mode, self.frames)
    }
}

impl TryFrom<BatchPayload> for Batch {
    type Error = DetectionError;

    fn try_from(payload: BatchPayload) -> Result<Self, Self::Error> {
        let mode = match payload.mode.trim().to_ascii_lowercase().as_str() {
            "live" => BatchMode::Live,
            "calibration" => {
                let machine_id = payload
                    .machine_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| DetectionError::MalformedBatch {
                        reason: "calibration batch requires a machine_id".to_string(),
                    })?;
                BatchMode::Calibration {
                    machine_id: machine_id.to_string(),
                }
            }
            _ => {
                return Err(DetectionError::UnknownMode { mode: payload.mode });
            }
        };

        let frames = payload
            .frames
            .into_iter()
            .enumerate()
            .map(|(index, frame)| {
                let built = SpectralFrame::new(frame.magnitudes, frame.nyquist, frame.timestamp_ms)
                    .and_then(|f| match frame.amplitude {
                        Some(amplitude) => f.with_amplitude(amplitude),
                        None => Ok(f),
                    });
                built.map_err(|err| match err {
                    DetectionError::MalformedBatch { reason } => DetectionError::MalformedBatch {
                        reason: format!("frame {}: {}", index, reason),
                    },
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Batch::new(mode, frames)
    }
}
