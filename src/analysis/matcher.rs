// MachineMatcher - per-batch multi-profile matching
//
// Every sufficiently loud peak of every frame is tested against the
// detection bounds of every profile. A peak that falls inside several
// ranges is credited to the profile whose median is closest, ties going to
// the lexicographically lower machine id. One credited peak anywhere in
// the batch is enough to put a machine in the raw set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::analysis::types::Peak;
use crate::calibration::MachineProfile;
use crate::config::MatchingConfig;

/// Result of matching one batch against the known profiles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Machines with at least one matching peak in the batch
    pub raw_detected: BTreeSet<String>,
    /// Machines with a peak just outside their bounds and none inside
    pub near_miss: BTreeSet<String>,
    /// Every profile id the batch was matched against
    pub all_known: BTreeSet<String>,
}

/// Matches peaks against machine profiles
#[derive(Debug, Clone)]
pub struct MachineMatcher {
    config: MatchingConfig,
}

impl MachineMatcher {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Match every frame of a batch against `profiles`
    ///
    /// # Arguments
    /// * `frames` - Peak lists, one per frame
    /// * `profiles` - Known machine profiles
    ///
    /// # Returns
    /// Raw detections, near misses and the full set of known ids
    pub fn match_batch(&self, frames: &[Vec<Peak>], profiles: &[MachineProfile]) -> MatchOutcome {
        let mut outcome = MatchOutcome {
            all_known: profiles.iter().map(|p| p.machine_id.clone()).collect(),
            ..MatchOutcome::default()
        };
        if profiles.is_empty() {
            return outcome;
        }

        for peak in frames
            .iter()
            .flatten()
            .filter(|p| p.amplitude >= self.config.min_peak_amplitude)
        {
            if let Some(owner) = self.best_match(peak.frequency, profiles) {
                outcome.raw_detected.insert(owner.machine_id.clone());
            }

            for profile in profiles {
                if self.is_near_miss(peak.frequency, profile) {
                    outcome.near_miss.insert(profile.machine_id.clone());
                }
            }
        }

        let detected = &outcome.raw_detected;
        outcome.near_miss.retain(|id| !detected.contains(id));
        outcome
    }

    /// Profile owning `frequency`, if any range contains it
    fn best_match<'a>(
        &self,
        frequency: f32,
        profiles: &'a [MachineProfile],
    ) -> Option<&'a MachineProfile> {
        profiles
            .iter()
            .filter(|p| p.contains(frequency))
            .min_by(|a, b| {
                let da = (frequency - a.median_frequency).abs();
                let db = (frequency - b.median_frequency).abs();
                da.partial_cmp(&db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.machine_id.cmp(&b.machine_id))
            })
    }

    /// Peak lies in the band `[near_miss_min, near_miss_max]` Hz outside the bounds
    fn is_near_miss(&self, frequency: f32, profile: &MachineProfile) -> bool {
        let (inner, outer) = (self.config.near_miss_min, self.config.near_miss_max);
        let below = profile.iqr_low - outer <= frequency && frequency < profile.iqr_low - inner;
        let above = profile.iqr_high + inner < frequency && frequency <= profile.iqr_high + outer;
        below || above
    }
}

impl Default for MachineMatcher {
    fn default() -> Self {
        Self::new(&MatchingConfig::default())
    }
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
