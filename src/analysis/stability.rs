// StabilityFilter - temporal vote over raw detections
//
// Each known machine keeps a fixed-capacity history of booleans, one per
// evaluated batch. A machine is stable when the share of `true` entries in
// its history reaches the threshold. The rate is taken over the entries
// recorded so far, so a freshly seen machine can become stable before its
// window has filled.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::StabilityConfig;

/// Ring buffer of per-batch detection results for one machine
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionHistory {
    entries: VecDeque<bool>,
    capacity: usize,
}

impl DetectionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a result, dropping the oldest one on overflow
    pub fn push(&mut self, detected: bool) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(detected);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn true_count(&self) -> usize {
        self.entries.iter().filter(|&&d| d).count()
    }

    /// Share of `true` entries over the current fill (0.0 when empty)
    pub fn rate(&self) -> f32 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.true_count() as f32 / self.entries.len() as f32
    }
}

/// Turns noisy raw detections into a stable "running" set
#[derive(Debug, Clone)]
pub struct StabilityFilter {
    config: StabilityConfig,
    histories: BTreeMap<String, DetectionHistory>,
}

impl StabilityFilter {
    pub fn new(config: &StabilityConfig) -> Self {
        Self {
            config: config.clone(),
            histories: BTreeMap::new(),
        }
    }

    /// Record one batch and return the machines currently stable
    ///
    /// # Arguments
    /// * `raw` - Machines detected in this batch
    /// * `all_known` - Every machine with a profile; others are forgotten
    pub fn update(
        &mut self,
        raw: &BTreeSet<String>,
        all_known: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        self.histories.retain(|id, _| all_known.contains(id));

        for id in all_known {
            let window = self.config.window;
            self.histories
                .entry(id.clone())
                .or_insert_with(|| DetectionHistory::new(window))
                .push(raw.contains(id));
        }

        self.stable()
    }

    /// Machines whose history currently passes the vote
    pub fn stable(&self) -> BTreeSet<String> {
        let min_observations = self.config.min_observations.max(1);
        self.histories
            .iter()
            .filter(|(_, h)| h.len() >= min_observations && h.rate() >= self.config.threshold)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn history(&self, machine_id: &str) -> Option<&DetectionHistory> {
        self.histories.get(machine_id)
    }

    /// Forget all histories
    pub fn reset(&mut self) {
        self.histories.clear();
    }
}

impl Default for StabilityFilter {
    fn default() -> Self {
        Self::new(&StabilityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    /// Feed `detected` true batches followed by `missed` false batches
    fn run(filter: &mut StabilityFilter, detected: usize, missed: usize) -> BTreeSet<String> {
        let known = set(&["pump"]);
        let mut stable = BTreeSet::new();
        for _ in 0..missed {
            stable = filter.update(&BTreeSet::new(), &known);
        }
        for _ in 0..detected {
            stable = filter.update(&known, &known);
        }
        stable
    }

    #[test]
    fn test_history_drops_oldest() {
        let mut history = DetectionHistory::new(3);
        history.push(true);
        history.push(false);
        history.push(false);
        history.push(false);

        assert_eq!(history.len(), 3);
        assert_eq!(history.true_count(), 0);
        assert_eq!(history.rate(), 0.0);
    }

    #[test]
    fn test_nine_of_fifteen_is_stable() {
        let mut filter = StabilityFilter::default();
        let stable = run(&mut filter, 9, 6);
        assert_eq!(filter.history("pump").map(|h| h.len()), Some(15));
        assert!(stable.contains("pump"), "9/15 = 0.6 meets the threshold");
    }

    #[test]
    fn test_eight_of_fifteen_is_not_stable() {
        let mut filter = StabilityFilter::default();
        let stable = run(&mut filter, 8, 7);
        assert!(stable.is_empty(), "8/15 = 0.533 is below the threshold");
    }

    #[test]
    fn test_rate_uses_current_fill() {
        let mut filter = StabilityFilter::default();
        let known = set(&["pump"]);

        let stable = filter.update(&known, &known);
        assert!(stable.contains("pump"), "1/1 is stable");

        let stable = filter.update(&BTreeSet::new(), &known);
        assert!(stable.is_empty(), "1/2 = 0.5 is not");
    }

    #[test]
    fn test_min_observations_gate() {
        let mut filter = StabilityFilter::new(&StabilityConfig {
            min_observations: 5,
            ..StabilityConfig::default()
        });
        let known = set(&["pump"]);
        for _ in 0..4 {
            assert!(filter.update(&known, &known).is_empty());
        }
        assert!(filter.update(&known, &known).contains("pump"));
    }

    #[test]
    fn test_every_known_machine_records_each_batch() {
        let mut filter = StabilityFilter::default();
        let known = set(&["fan", "pump"]);
        filter.update(&set(&["fan"]), &known);

        assert_eq!(filter.history("fan").map(|h| h.true_count()), Some(1));
        assert_eq!(filter.history("pump").map(|h| h.len()), Some(1));
        assert_eq!(filter.history("pump").map(|h| h.true_count()), Some(0));
    }

    #[test]
    fn test_deleted_profiles_are_forgotten() {
        let mut filter = StabilityFilter::default();
        filter.update(&set(&["fan"]), &set(&["fan", "pump"]));
        let stable = filter.update(&BTreeSet::new(), &set(&["pump"]));

        assert!(filter.history("fan").is_none());
        assert!(!stable.contains("fan"));
    }

    #[test]
    fn test_window_slides_out_old_detections() {
        let mut filter = StabilityFilter::default();
        let known = set(&["pump"]);
        for _ in 0..15 {
            filter.update(&known, &known);
        }
        for _ in 0..6 {
            filter.update(&BTreeSet::new(), &known);
        }
        assert!(filter.stable().contains("pump"), "9/15 after sliding");
        filter.update(&BTreeSet::new(), &known);
        assert!(filter.stable().is_empty(), "8/15 after sliding");
    }
}
