// NoiseModel - EWMA baseline of frame amplitude
//
// Tracks an exponentially weighted mean and variance of the time-domain
// amplitude of live frames and flags frames whose z-score reaches the
// threshold. Each sample is folded in before it is scored, so a single
// outlier can never score above 1/sqrt(alpha). The first observation seeds
// the mean and starts from unit variance.

use crate::config::NoiseConfig;

/// Result of feeding one amplitude into the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseObservation {
    /// Distance from the baseline in standard deviations
    pub z_score: f64,
    pub is_anomaly: bool,
}

#[derive(Debug, Clone)]
pub struct NoiseModel {
    alpha: f64,
    z_threshold: f64,
    mean: f64,
    variance: f64,
    initialized: bool,
}

impl NoiseModel {
    pub fn new(config: &NoiseConfig) -> Self {
        Self {
            alpha: config.alpha.clamp(0.0, 1.0),
            z_threshold: config.z_threshold,
            mean: 0.0,
            variance: 1.0,
            initialized: false,
        }
    }

    /// Fold `amplitude` into the baseline, then score it against the result
    pub fn observe(&mut self, amplitude: f32) -> NoiseObservation {
        let amplitude = f64::from(amplitude);
        if !self.initialized {
            self.mean = amplitude;
            self.variance = 1.0;
            self.initialized = true;
            return NoiseObservation {
                z_score: 0.0,
                is_anomaly: false,
            };
        }

        let diff = amplitude - self.mean;
        self.mean += self.alpha * diff;
        self.variance += self.alpha * (diff * diff - self.variance);

        let std_dev = if self.variance > 0.0 {
            self.variance.sqrt()
        } else {
            1.0
        };
        let z_score = diff.abs() / std_dev;

        NoiseObservation {
            z_score,
            is_anomaly: z_score >= self.z_threshold,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn reset(&mut self) {
        self.mean = 0.0;
        self.variance = 1.0;
        self.initialized = false;
    }
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self::new(&NoiseConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_seeds_baseline() {
        let mut model = NoiseModel::default();
        let obs = model.observe(0.4);
        assert!(!obs.is_anomaly);
        assert!((model.mean() - 0.4).abs() < 1e-6);
        assert_eq!(model.variance(), 1.0);
    }

    #[test]
    fn test_steady_signal_is_not_anomalous() {
        let mut model = NoiseModel::default();
        for _ in 0..200 {
            assert!(!model.observe(0.3).is_anomaly);
        }
    }

    #[test]
    fn test_sudden_jump_is_anomalous() {
        let mut model = NoiseModel::default();
        for _ in 0..500 {
            model.observe(0.3);
        }
        // Variance decays towards zero on a constant input
        let obs = model.observe(0.9);
        assert!(obs.is_anomaly, "z = {}", obs.z_score);
    }

    #[test]
    fn test_matches_reference_sequence() {
        let mut model = NoiseModel::default();
        let scores: Vec<f64> = [0.3_f32, 0.5, 0.1]
            .iter()
            .map(|&a| model.observe(a).z_score)
            .collect();

        assert_eq!(scores[0], 0.0);
        assert!((scores[1] - 0.201_948_086).abs() < 1e-6, "z = {}", scores[1]);
        assert!((scores[2] - 0.207_988_331).abs() < 1e-6, "z = {}", scores[2]);
        assert!((model.mean() - 0.299_920_011).abs() < 1e-6);
        assert!((model.variance() - 0.962_016_320).abs() < 1e-6);
    }

    #[test]
    fn test_small_step_after_long_steady_run_stays_below_threshold() {
        let mut model = NoiseModel::default();
        for _ in 0..500 {
            model.observe(0.30);
        }
        let obs = model.observe(0.32);
        assert!((obs.z_score - 2.856_441_559).abs() < 1e-4, "z = {}", obs.z_score);
        assert!(!obs.is_anomaly);
    }

    #[test]
    fn test_z_score_is_bounded_by_alpha() {
        let mut model = NoiseModel::default();
        for _ in 0..500 {
            model.observe(0.3);
        }
        let obs = model.observe(1_000.0);
        assert!(obs.z_score <= 1.0 / 0.02_f64.sqrt() + 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut model = NoiseModel::default();
        model.observe(0.5);
        model.observe(0.7);
        model.reset();
        model.observe(0.1);
        assert!((model.mean() - 0.1).abs() < 1e-6);
    }
}
