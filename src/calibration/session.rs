// CalibrationSession - per-machine frame collection window
//
// A session collects the peak lists of every calibration frame for one
// machine. It closes itself to new frames once the frame timestamps span
// the configured duration, and is frozen into a `FinalizedSession` when
// calibration is stopped. `FinalizedSession` is consumed by value when a
// profile is built, so a session can only ever produce one profile.

use serde::{Deserialize, Serialize};

use crate::analysis::Peak;

/// Outcome of appending one frame to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAppend {
    /// Frame was recorded
    Appended,
    /// Frame fell outside the session window and was ignored
    WindowElapsed,
}

/// Progress snapshot reported after each calibration batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    /// Machine being calibrated
    pub machine_id: String,
    /// Frames recorded so far
    pub frames_collected: usize,
    /// Whether the session window has been exhausted
    pub window_elapsed: bool,
}

/// Active, append-only calibration session
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    machine_id: String,
    frames: Vec<Vec<Peak>>,
    first_timestamp_ms: Option<u64>,
    last_timestamp_ms: Option<u64>,
    duration_ms: u64,
    window_elapsed: bool,
}

impl CalibrationSession {
    /// Start an empty session for `machine_id`
    ///
    /// # Arguments
    /// * `machine_id` - Machine being calibrated
    /// * `duration_ms` - Window length measured on frame timestamps
    pub fn new(machine_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            machine_id: machine_id.into(),
            frames: Vec::new(),
            first_timestamp_ms: None,
            last_timestamp_ms: None,
            duration_ms,
            window_elapsed: false,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Record the peaks of one frame captured at `timestamp_ms`
    ///
    /// Frames whose timestamp lies beyond `first + duration` are ignored and
    /// mark the window as elapsed.
    pub fn append(&mut self, timestamp_ms: u64, peaks: Vec<Peak>) -> SessionAppend {
        let first = *self.first_timestamp_ms.get_or_insert(timestamp_ms);
        if timestamp_ms.saturating_sub(first) > self.duration_ms {
            self.window_elapsed = true;
            return SessionAppend::WindowElapsed;
        }

        self.frames.push(peaks);
        self.last_timestamp_ms = Some(
            self.last_timestamp_ms
                .map_or(timestamp_ms, |last| last.max(timestamp_ms)),
        );
        SessionAppend::Appended
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_window_elapsed(&self) -> bool {
        self.window_elapsed
    }

    /// Current progress for reporting
    pub fn progress(&self) -> CalibrationProgress {
        CalibrationProgress {
            machine_id: self.machine_id.clone(),
            frames_collected: self.frames.len(),
            window_elapsed: self.window_elapsed,
        }
    }

    /// Freeze the session; no more frames can be added
    pub fn finalize(self) -> FinalizedSession {
        FinalizedSession {
            machine_id: self.machine_id,
            frames: self.frames,
            started_at_ms: self.first_timestamp_ms.unwrap_or(0),
            ended_at_ms: self.last_timestamp_ms.unwrap_or(0),
        }
    }
}

/// Frozen calibration data ready for profile building
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedSession {
    machine_id: String,
    frames: Vec<Vec<Peak>>,
    started_at_ms: u64,
    ended_at_ms: u64,
}

impl FinalizedSession {
    /// Build a finalized session directly from recorded peak lists
    ///
    /// Used when replaying stored calibration data.
    pub fn from_frames(
        machine_id: impl Into<String>,
        frames: Vec<Vec<Peak>>,
        started_at_ms: u64,
        ended_at_ms: u64,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            frames,
            started_at_ms,
            ended_at_ms,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn frames(&self) -> &[Vec<Peak>] {
        &self.frames
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn ended_at_ms(&self) -> u64 {
        self.ended_at_ms
    }
}
