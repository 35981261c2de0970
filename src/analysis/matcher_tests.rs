use super::*;

/// Helper to create a profile with explicit bounds
fn profile(id: &str, median: f32, low: f32, high: f32) -> MachineProfile {
    MachineProfile {
        machine_id: id.to_string(),
        median_frequency: median,
        iqr_low: low,
        iqr_high: high,
        harmonic_bands: Vec::new(),
        sample_count: 20,
        updated_at_ms: 0,
    }
}

/// Helper to create a loud peak at `frequency`
fn peak(frequency: f32) -> Peak {
    Peak {
        frequency,
        amplitude: 1.0,
        bin_index: 0,
    }
}

fn ids(set: &BTreeSet<String>) -> Vec<&str> {
    set.iter().map(String::as_str).collect()
}

#[test]
fn test_single_profile_match() {
    let profiles = vec![
        profile("compressor", 250.0, 240.0, 260.0),
        profile("pump", 520.0, 510.0, 530.0),
    ];
    let outcome = MachineMatcher::default().match_batch(&[vec![peak(252.0)]], &profiles);

    assert_eq!(ids(&outcome.raw_detected), vec!["compressor"]);
    assert_eq!(ids(&outcome.all_known), vec!["compressor", "pump"]);
}

#[test]
fn test_peaks_outside_every_range() {
    let profiles = vec![profile("compressor", 250.0, 240.0, 260.0)];
    let outcome =
        MachineMatcher::default().match_batch(&[vec![peak(100.0), peak(900.0)]], &profiles);

    assert!(outcome.raw_detected.is_empty());
    assert!(outcome.near_miss.is_empty());
    assert_eq!(outcome.all_known.len(), 1);
}

#[test]
fn test_bounds_are_inclusive() {
    let profiles = vec![profile("compressor", 250.0, 240.0, 260.0)];
    let matcher = MachineMatcher::default();

    assert_eq!(
        matcher.match_batch(&[vec![peak(240.0)]], &profiles).raw_detected.len(),
        1
    );
    assert_eq!(
        matcher.match_batch(&[vec![peak(260.0)]], &profiles).raw_detected.len(),
        1
    );
}

#[test]
fn test_multiple_machines_in_one_frame() {
    let profiles = vec![
        profile("machine_1", 250.0, 240.0, 260.0),
        profile("machine_2", 520.0, 510.0, 530.0),
    ];
    let outcome =
        MachineMatcher::default().match_batch(&[vec![peak(248.0), peak(519.0)]], &profiles);

    assert_eq!(ids(&outcome.raw_detected), vec!["machine_1", "machine_2"]);
}

#[test]
fn test_overlap_goes_to_closest_median() {
    let profiles = vec![
        profile("fan", 250.0, 230.0, 270.0),
        profile("motor", 262.0, 250.0, 274.0),
    ];
    let outcome = MachineMatcher::default().match_batch(&[vec![peak(258.0)]], &profiles);

    assert_eq!(
        ids(&outcome.raw_detected),
        vec!["motor"],
        "258 Hz is 4 Hz from motor's median and 8 Hz from fan's"
    );
}

#[test]
fn test_overlap_tie_goes_to_lower_id() {
    let profiles = vec![
        profile("zeta", 260.0, 240.0, 280.0),
        profile("alpha", 250.0, 230.0, 270.0),
    ];
    let outcome = MachineMatcher::default().match_batch(&[vec![peak(255.0)]], &profiles);

    assert_eq!(ids(&outcome.raw_detected), vec!["alpha"]);
}

#[test]
fn test_quiet_peaks_do_not_match() {
    let profiles = vec![profile("compressor", 250.0, 240.0, 260.0)];
    let quiet = Peak {
        frequency: 250.0,
        amplitude: 0.1,
        bin_index: 0,
    };
    let outcome = MachineMatcher::default().match_batch(&[vec![quiet]], &profiles);

    assert!(outcome.raw_detected.is_empty());
}

#[test]
fn test_union_across_frames() {
    let profiles = vec![
        profile("machine_1", 250.0, 240.0, 260.0),
        profile("machine_2", 520.0, 510.0, 530.0),
    ];
    let frames = vec![vec![peak(250.0)], vec![], vec![peak(521.0)]];
    let outcome = MachineMatcher::default().match_batch(&frames, &profiles);

    assert_eq!(outcome.raw_detected.len(), 2);
}

#[test]
fn test_near_miss_zone() {
    let profiles = vec![profile("compressor", 250.0, 240.0, 260.0)];
    let matcher = MachineMatcher::default();

    for (frequency, expected) in [
        (266.0, true),
        (270.0, true),
        (265.0, false),
        (270.5, false),
        (234.0, true),
        (230.0, true),
        (235.0, false),
    ] {
        let outcome = matcher.match_batch(&[vec![peak(frequency)]], &profiles);
        assert_eq!(
            outcome.near_miss.contains("compressor"),
            expected,
            "near miss at {} Hz",
            frequency
        );
    }
}

#[test]
fn test_near_miss_suppressed_by_detection() {
    let profiles = vec![profile("compressor", 250.0, 240.0, 260.0)];
    let outcome =
        MachineMatcher::default().match_batch(&[vec![peak(250.0), peak(267.0)]], &profiles);

    assert_eq!(ids(&outcome.raw_detected), vec!["compressor"]);
    assert!(outcome.near_miss.is_empty());
}

#[test]
fn test_no_profiles() {
    let outcome = MachineMatcher::default().match_batch(&[vec![peak(250.0)]], &[]);
    assert_eq!(outcome, MatchOutcome::default());
}
