// IdentificationEngine - orchestration of calibration and live detection
//
// The engine itself is stateless apart from its configuration and the
// profile store handle. Everything that changes between batches lives in
// the `DetectionContext` passed to each call.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{MachineMatcher, Peak, PeakExtractor, SpectralFrame};
use crate::calibration::{CalibrationProgress, FinalizedSession, MachineProfile, ProfileBuilder};
use crate::config::AppConfig;
use crate::context::DetectionContext;
use crate::error::{log_calibration_error, CalibrationError, EngineError};
use crate::ingest::{Batch, BatchMode};
use crate::storage::{FrameRecord, ProfileStore};
use crate::telemetry::BatchKind;

/// Outcome of one live batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionVerdict {
    /// Machines with a matching peak in this batch
    pub raw_detected: BTreeSet<String>,
    /// Machines passing the stability vote after this batch
    pub stable_detected: BTreeSet<String>,
    /// Every machine with a profile
    pub all_known: BTreeSet<String>,
    /// Machines with a peak just outside their bounds and none inside
    pub near_miss: BTreeSet<String>,
    /// Any frame's amplitude deviated from the noise baseline
    pub amplitude_anomaly: bool,
}

/// Outcome of one ingested batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "result", rename_all = "snake_case")]
pub enum IngestOutcome {
    Calibration(CalibrationProgress),
    Live(DetectionVerdict),
}

/// Outcome of a batch plus the frame records it produced
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedBatch {
    pub outcome: IngestOutcome,
    pub records: Vec<FrameRecord>,
}

/// Calibrates machines and identifies them in live batches
pub struct IdentificationEngine {
    config: AppConfig,
    extractor: PeakExtractor,
    builder: ProfileBuilder,
    matcher: MachineMatcher,
    store: Arc<dyn ProfileStore>,
}

impl IdentificationEngine {
    pub fn new(config: AppConfig, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            extractor: PeakExtractor::new(&config.peak_extraction),
            builder: ProfileBuilder::new(config.calibration.clone()),
            matcher: MachineMatcher::new(&config.matching),
            config,
            store,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Create a context configured for this engine
    pub fn new_context(&self) -> DetectionContext {
        DetectionContext::new(&self.config)
    }

    // ========================================================================
    // CALIBRATION
    // ========================================================================

    /// Begin a calibration session for `machine_id`
    ///
    /// # Errors
    /// `InvalidMachineId`, `AlreadyCalibrating` or `StatePoisoned`
    pub fn start_calibration(
        &self,
        ctx: &DetectionContext,
        machine_id: &str,
    ) -> Result<(), EngineError> {
        Ok(ctx.calibration().start(machine_id)?)
    }

    /// Stop the active session and return it for profile building
    ///
    /// # Errors
    /// `NotCalibrating` or `StatePoisoned`
    pub fn stop_calibration(&self, ctx: &DetectionContext) -> Result<FinalizedSession, EngineError> {
        Ok(ctx.calibration().stop()?)
    }

    /// Build a profile from `session` and upsert it
    ///
    /// Nothing is written when the session is rejected.
    ///
    /// # Errors
    /// `InsufficientFrames`, `ProfileRejected`, `InvalidMachineId`, or
    /// `Storage` when the upsert fails
    pub fn build_profile(&self, session: FinalizedSession) -> Result<MachineProfile, EngineError> {
        let profile = self.builder.build(&session).inspect_err(|err| {
            log_calibration_error(err, "ProfileBuilder", "build_profile");
        })?;

        self.store.upsert(profile.clone()).map_err(|err| {
            let err = CalibrationError::Storage {
                reason: err.to_string(),
            };
            log_calibration_error(&err, "IdentificationEngine", "build_profile");
            err
        })?;

        log::info!(
            "[IdentificationEngine] Profile '{}' stored ({:.1} Hz, [{:.1}, {:.1}])",
            profile.machine_id,
            profile.median_frequency,
            profile.iqr_low,
            profile.iqr_high
        );
        Ok(profile)
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Route a validated batch to calibration or live detection
    ///
    /// # Errors
    /// Calibration batches fail with `NotCalibrating` or `MachineMismatch`
    /// when they do not fit the active session. Live batches fail only on
    /// storage or lock errors.
    pub fn ingest_batch(
        &self,
        ctx: &DetectionContext,
        batch: Batch,
    ) -> Result<IngestOutcome, EngineError> {
        self.process_batch(ctx, batch).map(|processed| processed.outcome)
    }

    /// Like `ingest_batch`, also returning a record of every frame that
    /// carried peaks, for the frame log
    pub fn process_batch(
        &self,
        ctx: &DetectionContext,
        batch: Batch,
    ) -> Result<ProcessedBatch, EngineError> {
        let (mode, frames) = batch.into_parts();
        match mode {
            BatchMode::Calibration { machine_id } => {
                let records = self.frame_records(&frames, BatchKind::Calibration, Some(&machine_id));
                let progress = self.ingest_calibration(ctx, &machine_id, &records, frames.len())?;
                Ok(ProcessedBatch {
                    outcome: IngestOutcome::Calibration(progress),
                    records,
                })
            }
            BatchMode::Live => {
                let records = self.frame_records(&frames, BatchKind::Live, None);
                let verdict = self.ingest_live(ctx, &records, frames.len())?;
                Ok(ProcessedBatch {
                    outcome: IngestOutcome::Live(verdict),
                    records,
                })
            }
        }
    }

    /// Peaks of one frame, empty when the frame is below the amplitude gate
    pub fn extract_peaks(&self, frame: &SpectralFrame) -> Vec<Peak> {
        if self.is_gated(frame) {
            return Vec::new();
        }
        self.extractor.extract(frame)
    }

    fn is_gated(&self, frame: &SpectralFrame) -> bool {
        frame
            .amplitude()
            .is_some_and(|a| a < self.config.peak_extraction.min_frame_amplitude)
    }

    /// Gated, peakless frames produce no record
    fn frame_records(
        &self,
        frames: &[SpectralFrame],
        mode: BatchKind,
        machine_id: Option<&str>,
    ) -> Vec<FrameRecord> {
        frames
            .iter()
            .filter_map(|frame| {
                FrameRecord::from_frame(frame, &self.extract_peaks(frame), mode, machine_id)
            })
            .collect()
    }

    fn ingest_calibration(
        &self,
        ctx: &DetectionContext,
        machine_id: &str,
        records: &[FrameRecord],
        frames_in: usize,
    ) -> Result<CalibrationProgress, EngineError> {
        let recorded = records
            .iter()
            .map(|record| (record.timestamp_ms, record.peaks.clone()));

        let progress = ctx.calibration().append(machine_id, recorded)?;
        tracing::debug!(
            "[IdentificationEngine] Calibration batch for '{}': {} frames in, {} collected",
            machine_id,
            frames_in,
            progress.frames_collected
        );
        Ok(progress)
    }

    fn ingest_live(
        &self,
        ctx: &DetectionContext,
        records: &[FrameRecord],
        frames_in: usize,
    ) -> Result<DetectionVerdict, EngineError> {
        // Held for the whole evaluation so histories advance in arrival order
        let mut stability = ctx.lock_stability()?;
        let profiles = self.store.list()?;

        let mut amplitude_anomaly = false;
        {
            let mut noise = ctx.lock_noise()?;
            for amplitude in records.iter().filter_map(|record| record.amplitude) {
                amplitude_anomaly |= noise.observe(amplitude).is_anomaly;
            }
        }

        let frame_peaks: Vec<Vec<Peak>> = records.iter().map(|r| r.peaks.clone()).collect();
        let outcome = self.matcher.match_batch(&frame_peaks, &profiles);
        let stable_detected = stability.update(&outcome.raw_detected, &outcome.all_known);

        tracing::debug!(
            "[IdentificationEngine] Live batch: {} frames, raw={:?}, stable={:?}",
            frames_in,
            outcome.raw_detected,
            stable_detected
        );

        Ok(DetectionVerdict {
            raw_detected: outcome.raw_detected,
            stable_detected,
            all_known: outcome.all_known,
            near_miss: outcome.near_miss,
            amplitude_anomaly,
        })
    }

    // ========================================================================
    // PROFILES
    // ========================================================================

    pub fn profile(&self, machine_id: &str) -> Result<Option<MachineProfile>, EngineError> {
        Ok(self.store.get(machine_id)?)
    }

    /// Every stored profile, ordered by machine id
    pub fn profiles(&self) -> Result<Vec<MachineProfile>, EngineError> {
        Ok(self.store.list()?)
    }

    /// Delete a profile; its detection history is dropped on the next live batch
    pub fn delete_profile(&self, machine_id: &str) -> Result<bool, EngineError> {
        let deleted = self.store.delete(machine_id)?;
        if deleted {
            log::info!("[IdentificationEngine] Profile '{}' deleted", machine_id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
