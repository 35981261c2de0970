// Harmonic band clustering
//
// Groups every sufficiently loud peak of a calibration session into
// fixed-width frequency buckets and summarizes each populated bucket as a
// band. Bands are stored with the profile for diagnostics; live matching
// does not consult them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::statistics::{mean, sorted_finite, Quartiles};
use crate::analysis::Peak;
use crate::config::BandConfig;

/// One recurring frequency band observed during calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicBand {
    /// Mean frequency of the band's samples, in Hz
    pub center: f32,
    /// Lower bound, in Hz
    pub low: f32,
    /// Upper bound, in Hz
    pub high: f32,
    /// Number of peaks that fell in the band
    pub sample_count: usize,
}

/// Cluster the peaks of all frames into at most `max_bands` bands
///
/// # Returns
/// Bands ordered by ascending center. Empty when no bucket reaches
/// `min_samples`.
pub fn cluster_bands(frames: &[Vec<Peak>], config: &BandConfig) -> Vec<HarmonicBand> {
    if config.bucket_width <= 0.0 || config.max_bands == 0 {
        return Vec::new();
    }

    let mut buckets: BTreeMap<i64, Vec<f32>> = BTreeMap::new();
    for peak in frames.iter().flatten() {
        if peak.frequency > 0.0 && peak.amplitude >= config.min_amplitude {
            let key = (peak.frequency / config.bucket_width).round() as i64;
            buckets.entry(key).or_default().push(peak.frequency);
        }
    }

    let mut bands: Vec<HarmonicBand> = buckets
        .into_values()
        .filter(|freqs| freqs.len() >= config.min_samples)
        .filter_map(|freqs| summarize(&freqs))
        .collect();

    // Most populated first, then keep the top N and present them by frequency
    bands.sort_by(|a, b| {
        b.sample_count.cmp(&a.sample_count).then(
            a.center
                .partial_cmp(&b.center)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    bands.truncate(config.max_bands);
    bands.sort_by(|a, b| {
        a.center
            .partial_cmp(&b.center)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    bands
}

fn summarize(freqs: &[f32]) -> Option<HarmonicBand> {
    let sorted = sorted_finite(freqs);
    let quartiles = Quartiles::from_sorted(&sorted)?;
    let iqr = quartiles.iqr();
    Some(HarmonicBand {
        center: mean(&sorted)?,
        low: (quartiles.q1 - 0.5 * iqr).max(0.0),
        high: quartiles.q3 + 0.5 * iqr,
        sample_count: sorted.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(frequency: f32, amplitude: f32) -> Peak {
        Peak {
            frequency,
            amplitude,
            bin_index: 0,
        }
    }

    fn config(min_samples: usize, max_bands: usize) -> BandConfig {
        BandConfig {
            bucket_width: 15.0,
            min_samples,
            max_bands,
            min_amplitude: 0.1,
        }
    }

    #[test]
    fn test_fundamental_and_harmonic_bands() {
        let frames: Vec<Vec<Peak>> = (0..20)
            .map(|i| {
                let jitter = (i % 3) as f32;
                vec![peak(249.0 + jitter, 1.0), peak(499.0 + jitter, 0.6)]
            })
            .collect();

        let bands = cluster_bands(&frames, &config(15, 5));
        assert_eq!(bands.len(), 2);
        assert!(bands[0].center < bands[1].center);
        assert_eq!(bands[0].sample_count, 20);
        assert!(bands[0].low <= 249.0 && bands[0].high >= 251.0);
    }

    #[test]
    fn test_sparse_buckets_dropped() {
        let frames: Vec<Vec<Peak>> = (0..20)
            .map(|i| {
                let mut peaks = vec![peak(300.0, 1.0)];
                if i < 3 {
                    peaks.push(peak(900.0, 0.5));
                }
                peaks
            })
            .collect();

        let bands = cluster_bands(&frames, &config(15, 5));
        assert_eq!(bands.len(), 1);
        assert!((bands[0].center - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_quiet_peaks_ignored() {
        let frames: Vec<Vec<Peak>> = (0..20).map(|_| vec![peak(300.0, 0.05)]).collect();
        assert!(cluster_bands(&frames, &config(15, 5)).is_empty());
    }

    #[test]
    fn test_max_bands_keeps_most_populated() {
        let mut frames = Vec::new();
        for i in 0..30 {
            let mut peaks = vec![peak(100.0, 1.0)];
            if i < 20 {
                peaks.push(peak(400.0, 0.5));
            }
            if i < 10 {
                peaks.push(peak(700.0, 0.5));
            }
            frames.push(peaks);
        }

        let bands = cluster_bands(&frames, &config(5, 2));
        let centers: Vec<f32> = bands.iter().map(|b| b.center.round()).collect();
        assert_eq!(centers, vec![100.0, 400.0]);
    }
}
