// Frame log - append-only JSONL record of every frame that carried peaks
//
// One line per frame. Calibration records keep their machine id, so a
// session can be rebuilt from the log later without the original batches.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::analysis::{Peak, SpectralFrame};
use crate::calibration::FinalizedSession;
use crate::error::StorageError;
use crate::telemetry::BatchKind;

/// One recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<f32>,
    /// Frequency of the strongest peak, in Hz
    pub dominant_frequency: f32,
    /// Normalized amplitude of the strongest peak
    pub confidence: f32,
    pub peaks: Vec<Peak>,
    pub mode: BatchKind,
    /// Set for calibration frames only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
}

impl FrameRecord {
    /// Record for a frame, or `None` when it yielded no peaks
    pub fn from_frame(
        frame: &SpectralFrame,
        peaks: &[Peak],
        mode: BatchKind,
        machine_id: Option<&str>,
    ) -> Option<Self> {
        let dominant = peaks.first()?;
        Some(Self {
            timestamp_ms: frame.timestamp_ms(),
            amplitude: frame.amplitude(),
            dominant_frequency: dominant.frequency,
            confidence: dominant.amplitude,
            peaks: peaks.to_vec(),
            mode,
            machine_id: machine_id.map(str::to_string),
        })
    }
}

/// Appends frame records to a JSONL file
#[derive(Debug)]
pub struct FrameLog {
    path: PathBuf,
    // Serializes appends so lines from concurrent writers never interleave
    write_lock: Mutex<()>,
}

impl FrameLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `records` as one write; returns the number of lines written
    pub fn append(&self, records: &[FrameRecord]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&buffer)?;

        log::debug!(
            "[FrameLog] Appended {} records to {:?}",
            records.len(),
            self.path
        );
        Ok(records.len())
    }

    /// Every record in the log, ordered by timestamp
    ///
    /// A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<FrameRecord>, StorageError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str::<FrameRecord>(&line)?);
        }
        // Writers may finish out of order; timestamps are the source of truth
        records.sort_by_key(|record| record.timestamp_ms);
        Ok(records)
    }

    /// Rebuild the calibration session of `machine_id` that started at
    /// `started_at_ms`, keeping only frames inside the `duration_ms` window
    pub fn read_session(
        &self,
        machine_id: &str,
        started_at_ms: u64,
        duration_ms: u64,
    ) -> Result<FinalizedSession, StorageError> {
        let window_end = started_at_ms.saturating_add(duration_ms);
        let records: Vec<FrameRecord> = self
            .read_all()?
            .into_iter()
            .filter(|record| {
                record.mode == BatchKind::Calibration
                    && record.machine_id.as_deref() == Some(machine_id)
                    && (started_at_ms..=window_end).contains(&record.timestamp_ms)
            })
            .collect();

        let first = records.first().map_or(started_at_ms, |r| r.timestamp_ms);
        let last = records.last().map_or(started_at_ms, |r| r.timestamp_ms);
        let frames = records.into_iter().map(|record| record.peaks).collect();
        Ok(FinalizedSession::from_frames(machine_id, frames, first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(timestamp_ms: u64, frequency: f32, machine_id: Option<&str>) -> FrameRecord {
        let peak = Peak {
            frequency,
            amplitude: 1.0,
            bin_index: frequency as usize,
        };
        FrameRecord {
            timestamp_ms,
            amplitude: Some(0.2),
            dominant_frequency: frequency,
            confidence: 1.0,
            peaks: vec![peak],
            mode: if machine_id.is_some() {
                BatchKind::Calibration
            } else {
                BatchKind::Live
            },
            machine_id: machine_id.map(str::to_string),
        }
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = FrameLog::new(dir.path().join("frames.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_appends_accumulate_in_timestamp_order() {
        let dir = TempDir::new().unwrap();
        let log = FrameLog::new(dir.path().join("nested").join("frames.jsonl"));

        assert_eq!(log.append(&[record(200, 250.0, None)]).unwrap(), 1);
        assert_eq!(
            log.append(&[record(100, 251.0, None), record(300, 252.0, None)])
                .unwrap(),
            2
        );
        assert_eq!(log.append(&[]).unwrap(), 0);

        let stamps: Vec<u64> = log
            .read_all()
            .unwrap()
            .iter()
            .map(|r| r.timestamp_ms)
            .collect();
        assert_eq!(stamps, vec![100, 200, 300]);
    }

    #[test]
    fn test_read_session_filters_machine_mode_and_window() {
        let dir = TempDir::new().unwrap();
        let log = FrameLog::new(dir.path().join("frames.jsonl"));
        log.append(&[
            record(1_000, 250.0, Some("fan")),
            record(1_500, 251.0, Some("fan")),
            record(1_600, 520.0, Some("pump")),
            record(1_700, 900.0, None),
            record(9_000, 249.0, Some("fan")),
        ])
        .unwrap();

        let session = log.read_session("fan", 1_000, 2_000).unwrap();
        assert_eq!(session.machine_id(), "fan");
        assert_eq!(session.frames().len(), 2);
        assert_eq!(session.started_at_ms(), 1_000);
        assert_eq!(session.ended_at_ms(), 1_500);
    }

    #[test]
    fn test_corrupt_line_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.jsonl");
        fs::write(&path, "{not json}\n").unwrap();

        let err = FrameLog::new(&path).read_all().unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }
}
