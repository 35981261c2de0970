// Types module - spectral frames and peaks
//
// These are the values flowing between the extractor, the calibration
// session and the matcher. A `SpectralFrame` can only be built through
// `SpectralFrame::new`, so everything downstream may assume finite,
// non-negative magnitudes and a positive Nyquist frequency.

use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

/// One magnitude spectrum supplied by the external capture/FFT stage
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    magnitudes: Vec<f32>,
    nyquist: f32,
    timestamp_ms: u64,
    amplitude: Option<f32>,
}

impl SpectralFrame {
    /// Validate and build a frame
    ///
    /// # Errors
    /// `MalformedBatch` if any magnitude is negative or non-finite, or the
    /// Nyquist frequency is not a positive finite number.
    pub fn new(
        magnitudes: Vec<f32>,
        nyquist: f32,
        timestamp_ms: u64,
    ) -> Result<Self, DetectionError> {
        if !nyquist.is_finite() || nyquist <= 0.0 {
            return Err(DetectionError::MalformedBatch {
                reason: format!("nyquist {} must be a positive finite frequency", nyquist),
            });
        }

        if let Some((bin, value)) = magnitudes
            .iter()
            .enumerate()
            .find(|(_, m)| !m.is_finite() || **m < 0.0)
        {
            return Err(DetectionError::MalformedBatch {
                reason: format!("magnitude {} at bin {} is not a finite non-negative value", value, bin),
            });
        }

        Ok(Self {
            magnitudes,
            nyquist,
            timestamp_ms,
            amplitude: None,
        })
    }

    /// Attach the time-domain amplitude reported by the capture side
    ///
    /// # Errors
    /// `MalformedBatch` if the amplitude is negative or non-finite.
    pub fn with_amplitude(mut self, amplitude: f32) -> Result<Self, DetectionError> {
        if !amplitude.is_finite() || amplitude < 0.0 {
            return Err(DetectionError::MalformedBatch {
                reason: format!("amplitude {} must be a finite non-negative value", amplitude),
            });
        }
        self.amplitude = Some(amplitude);
        Ok(self)
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn nyquist(&self) -> f32 {
        self.nyquist
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn amplitude(&self) -> Option<f32> {
        self.amplitude
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    /// Frequency in Hz represented by `bin`
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        if self.magnitudes.is_empty() {
            return 0.0;
        }
        (bin as f32 / self.magnitudes.len() as f32) * self.nyquist
    }
}

/// A dominant narrowband component found in one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Frequency in Hz
    pub frequency: f32,
    /// Magnitude normalized by the frame maximum (0.0 to 1.0)
    pub amplitude: f32,
    /// Source bin in the magnitude array
    pub bin_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_negative_magnitude() {
        let result = SpectralFrame::new(vec![0.0, 1.0, -0.5], 22050.0, 0);
        match result {
            Err(DetectionError::MalformedBatch { reason }) => assert!(reason.contains("bin 2")),
            other => panic!("Expected MalformedBatch, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_rejects_nan_and_bad_nyquist() {
        assert!(SpectralFrame::new(vec![0.0, f32::NAN], 22050.0, 0).is_err());
        assert!(SpectralFrame::new(vec![0.0, 1.0], 0.0, 0).is_err());
        assert!(SpectralFrame::new(vec![0.0, 1.0], f32::INFINITY, 0).is_err());
    }

    #[test]
    fn test_frame_amplitude_validation() {
        let frame = SpectralFrame::new(vec![0.0; 8], 100.0, 5).unwrap();
        assert!(frame.clone().with_amplitude(-1.0).is_err());
        let frame = frame.with_amplitude(0.4).unwrap();
        assert_eq!(frame.amplitude(), Some(0.4));
    }

    #[test]
    fn test_bin_frequency() {
        let frame = SpectralFrame::new(vec![0.0; 1024], 22050.0, 0).unwrap();
        assert!((frame.bin_frequency(512) - 11025.0).abs() < 1e-3);
        assert_eq!(frame.bin_frequency(0), 0.0);
    }
}
