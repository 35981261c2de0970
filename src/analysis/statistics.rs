//! Order statistics over frequency samples.
//!
//! Percentiles use linear interpolation between the two nearest order
//! statistics at position `p * (n - 1)`.

use std::cmp::Ordering;

/// First quartile, median and third quartile of a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    pub q1: f32,
    pub median: f32,
    pub q3: f32,
}

impl Quartiles {
    /// Compute quartiles over unsorted values; `None` for an empty sample.
    pub fn from_unsorted(values: &[f32]) -> Option<Self> {
        let sorted = sorted_finite(values);
        Self::from_sorted(&sorted)
    }

    /// Compute quartiles over values already sorted ascending.
    pub fn from_sorted(sorted: &[f32]) -> Option<Self> {
        Some(Self {
            q1: percentile_sorted(sorted, 0.25)?,
            median: percentile_sorted(sorted, 0.5)?,
            q3: percentile_sorted(sorted, 0.75)?,
        })
    }

    pub fn iqr(&self) -> f32 {
        self.q3 - self.q1
    }
}

/// Sort the finite values of `values` ascending.
pub fn sorted_finite(values: &[f32]) -> Vec<f32> {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Linear-interpolation percentile of an ascending slice.
///
/// `quantile` is clamped to `[0, 1]`. Returns `None` when `sorted` is empty.
pub fn percentile_sorted(sorted: &[f32], quantile: f32) -> Option<f32> {
    if sorted.is_empty() {
        return None;
    }
    let q = quantile.clamp(0.0, 1.0);
    let rank = (sorted.len() - 1) as f32 * q;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f32;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f32>() / values.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeated(base: &[f32], times: usize) -> Vec<f32> {
        base.iter()
            .cycle()
            .take(base.len() * times)
            .copied()
            .collect()
    }

    #[test]
    fn test_empty_sample() {
        assert!(Quartiles::from_unsorted(&[]).is_none());
        assert!(percentile_sorted(&[], 0.5).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_single_value() {
        let q = Quartiles::from_unsorted(&[42.0]).unwrap();
        assert_eq!(q.q1, 42.0);
        assert_eq!(q.median, 42.0);
        assert_eq!(q.q3, 42.0);
        assert_eq!(q.iqr(), 0.0);
    }

    #[test]
    fn test_linear_interpolation() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        // rank = 3 * 0.25 = 0.75 -> 10 + 0.75 * 10
        assert!((percentile_sorted(&sorted, 0.25).unwrap() - 17.5).abs() < 1e-5);
        // rank = 1.5 -> 25
        assert!((percentile_sorted(&sorted, 0.5).unwrap() - 25.0).abs() < 1e-5);
        assert_eq!(percentile_sorted(&sorted, 1.0).unwrap(), 40.0);
        assert_eq!(percentile_sorted(&sorted, 2.0).unwrap(), 40.0);
    }

    #[test]
    fn test_calibration_reference_sample() {
        for times in [1, 2, 3, 10] {
            let values = repeated(&[260.0, 240.0, 255.0, 245.0, 250.0], times);
            let q = Quartiles::from_unsorted(&values).unwrap();
            assert!((q.median - 250.0).abs() < 1e-4, "median for x{}", times);
            assert!((q.q1 - 245.0).abs() < 1e-4, "q1 for x{}", times);
            assert!((q.q3 - 255.0).abs() < 1e-4, "q3 for x{}", times);
            assert!((q.iqr() - 10.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let sorted = sorted_finite(&[3.0, f32::NAN, 1.0, f32::INFINITY, 2.0]);
        assert_eq!(sorted, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[1.0, 2.0, 3.0, 6.0]), Some(3.0));
    }
}
