// PeakExtractor - dominant narrowband peaks from one magnitude spectrum
//
// A bin is a candidate when it is strictly louder than the two bins on
// each side and strictly above the detection threshold. The two bins at
// each edge are never candidates. Candidates are accepted loudest first,
// skipping any that sit closer than `min_bin_separation` to a peak that
// was already accepted, until `max_peaks` are taken.

use std::cmp::Ordering;

use crate::analysis::types::{Peak, SpectralFrame};
use crate::config::{PeakExtractionConfig, ThresholdMode};

/// Bins excluded at each edge of the spectrum
const EDGE_BINS: usize = 2;

/// Extracts up to `max_peaks` dominant peaks per frame
#[derive(Debug, Clone)]
pub struct PeakExtractor {
    max_peaks: usize,
    min_bin_separation: usize,
    threshold: ThresholdMode,
}

impl PeakExtractor {
    /// Create an extractor from configuration
    pub fn new(config: &PeakExtractionConfig) -> Self {
        match config.threshold {
            ThresholdMode::Absolute { floor } => {
                log::info!("[PeakExtractor] Absolute threshold active (floor={})", floor)
            }
            ThresholdMode::Relative { fraction } => log::info!(
                "[PeakExtractor] Relative threshold active ({}x frame max)",
                fraction
            ),
        }

        Self {
            max_peaks: config.max_peaks,
            min_bin_separation: config.min_bin_separation,
            threshold: config.threshold,
        }
    }

    /// Extract peaks from a frame
    ///
    /// # Returns
    /// Peaks sorted by descending amplitude. Empty for silent, flat or
    /// too-short frames, which is a normal outcome.
    pub fn extract(&self, frame: &SpectralFrame) -> Vec<Peak> {
        let mags = frame.magnitudes();
        if mags.len() < 2 * EDGE_BINS + 1 || self.max_peaks == 0 {
            return Vec::new();
        }

        let frame_max = mags.iter().copied().fold(0.0_f32, f32::max);
        if frame_max <= 0.0 {
            return Vec::new();
        }
        let threshold = self.threshold.resolve(frame_max);

        let mut candidates: Vec<usize> = (EDGE_BINS..mags.len() - EDGE_BINS)
            .filter(|&i| {
                let m = mags[i];
                m > threshold
                    && m > mags[i - 1]
                    && m > mags[i - 2]
                    && m > mags[i + 1]
                    && m > mags[i + 2]
            })
            .collect();

        candidates.sort_by(|&a, &b| {
            mags[b]
                .partial_cmp(&mags[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut accepted: Vec<usize> = Vec::with_capacity(self.max_peaks);
        for bin in candidates {
            if accepted.len() >= self.max_peaks {
                break;
            }
            let far_enough = accepted
                .iter()
                .all(|&taken| taken.abs_diff(bin) >= self.min_bin_separation);
            if far_enough {
                accepted.push(bin);
            }
        }

        accepted
            .into_iter()
            .map(|bin| Peak {
                frequency: frame.bin_frequency(bin),
                amplitude: mags[bin] / frame_max,
                bin_index: bin,
            })
            .collect()
    }
}

impl Default for PeakExtractor {
    fn default() -> Self {
        Self::new(&PeakExtractionConfig::default())
    }
}
