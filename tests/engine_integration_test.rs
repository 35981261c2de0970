//! Integration tests for live identification
//!
//! Covers the end-to-end path from calibration to stable verdicts, both
//! through direct engine calls and through the async ingestion worker.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::StreamExt;
use machine_listener::error::DetectionError;
use machine_listener::storage::InMemoryProfileStore;
use machine_listener::telemetry::{MetricEvent, TelemetryHub};
use machine_listener::{
    AppConfig, Batch, BatchPayload, DetectionContext, DetectionVerdict, FramePayload,
    IdentificationEngine, IngestOutcome, IngestionWorker,
};

const BINS: usize = 2048;

fn tone_frame(tones: &[usize], timestamp_ms: u64) -> FramePayload {
    let mut magnitudes = vec![0.01_f32; BINS];
    for (i, &bin) in tones.iter().enumerate() {
        let level = 1.0 - i as f32 * 0.2;
        magnitudes[bin] = level;
        magnitudes[bin - 1] = level * 0.5;
        magnitudes[bin + 1] = level * 0.5;
    }
    FramePayload {
        magnitudes,
        nyquist: BINS as f32,
        timestamp_ms,
        amplitude: Some(0.3),
    }
}

fn calibrate(engine: &IdentificationEngine, ctx: &DetectionContext, machine_id: &str, center: usize) {
    let frames = (0..20)
        .map(|i| tone_frame(&[center - 2 + i % 5], i as u64 * 100))
        .collect();
    engine.start_calibration(ctx, machine_id).unwrap();
    engine
        .ingest_batch(
            ctx,
            Batch::try_from(BatchPayload::calibration(machine_id, frames)).unwrap(),
        )
        .unwrap();
    let session = engine.stop_calibration(ctx).unwrap();
    engine.build_profile(session).unwrap();
}

fn live(engine: &IdentificationEngine, ctx: &DetectionContext, tones: &[usize]) -> DetectionVerdict {
    let batch = Batch::try_from(BatchPayload::live(vec![tone_frame(tones, 0)])).unwrap();
    match engine.ingest_batch(ctx, batch).unwrap() {
        IngestOutcome::Live(verdict) => verdict,
        other => panic!("Expected live outcome, got {:?}", other),
    }
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn setup() -> (Arc<IdentificationEngine>, Arc<DetectionContext>) {
    let engine = Arc::new(IdentificationEngine::new(
        AppConfig::default(),
        Arc::new(InMemoryProfileStore::new()),
    ));
    let ctx = Arc::new(engine.new_context());
    (engine, ctx)
}

/// Two machines calibrated at 250 Hz and 520 Hz, both running
#[test]
fn test_two_machines_running_together() {
    let (engine, ctx) = setup();
    calibrate(&engine, &ctx, "machine_1", 250);
    calibrate(&engine, &ctx, "machine_2", 520);

    let verdict = live(&engine, &ctx, &[248, 519]);
    assert_eq!(verdict.raw_detected, set(&["machine_1", "machine_2"]));
    assert_eq!(verdict.all_known, set(&["machine_1", "machine_2"]));
}

/// A machine switching off drops out of the stable set once its rate falls
#[test]
fn test_machine_switching_off() {
    let (engine, ctx) = setup();
    calibrate(&engine, &ctx, "machine_1", 250);
    calibrate(&engine, &ctx, "machine_2", 520);

    for _ in 0..15 {
        let verdict = live(&engine, &ctx, &[250, 520]);
        assert_eq!(verdict.stable_detected, set(&["machine_1", "machine_2"]));
    }

    // machine_2 stops: 9/15 still stable, 8/15 is not
    let mut last = DetectionVerdict::default();
    for _ in 0..6 {
        last = live(&engine, &ctx, &[250]);
    }
    assert_eq!(last.stable_detected, set(&["machine_1", "machine_2"]));

    let verdict = live(&engine, &ctx, &[250]);
    assert_eq!(verdict.raw_detected, set(&["machine_1"]));
    assert_eq!(verdict.stable_detected, set(&["machine_1"]));
}

/// Separate contexts keep separate histories
#[test]
fn test_contexts_are_independent() {
    let (engine, ctx) = setup();
    calibrate(&engine, &ctx, "fan", 300);

    let other = engine.new_context();
    live(&engine, &ctx, &[300]);
    let verdict = live(&engine, &other, &[900]);

    assert!(verdict.stable_detected.is_empty());
    assert_eq!(
        ctx.lock_stability()
            .unwrap()
            .history("fan")
            .map(|h| h.true_count()),
        Some(1)
    );
}

/// Batches submitted to the worker are processed in submission order
#[tokio::test]
async fn test_worker_processes_in_order() {
    let (engine, ctx) = setup();
    let telemetry = Arc::new(TelemetryHub::default());
    engine.start_calibration(&ctx, "pump").unwrap();

    let (handle, worker) = IngestionWorker::spawn(
        Arc::clone(&engine),
        Arc::clone(&ctx),
        Arc::clone(&telemetry),
    );
    let mut outcomes = handle.subscribe();

    for batch in 0..5u64 {
        let frames = (0..4)
            .map(|i| tone_frame(&[520], batch * 1_000 + i * 100))
            .collect();
        let ack = handle
            .submit(BatchPayload::calibration("pump", frames))
            .unwrap();
        assert!(ack.queue_depth >= 1);
    }
    drop(handle);

    let mut collected = Vec::new();
    while let Some(outcome) = outcomes.next().await {
        match outcome {
            IngestOutcome::Calibration(progress) => collected.push(progress.frames_collected),
            other => panic!("Expected calibration outcome, got {:?}", other),
        }
    }
    worker.join().await.unwrap();

    assert_eq!(collected, vec![4, 8, 12, 16, 20]);

    let session = engine.stop_calibration(&ctx).unwrap();
    let profile = engine.build_profile(session).unwrap();
    assert!((profile.median_frequency - 520.0).abs() < 1e-3);

    let snapshot = telemetry.snapshot();
    let processed = snapshot
        .recent
        .iter()
        .filter(|event| matches!(event, MetricEvent::BatchProcessed { .. }))
        .count();
    assert_eq!(processed, 5);
}

/// Batches that fail inside the worker do not stop it
#[tokio::test]
async fn test_worker_survives_failed_batches() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.ingestion.failed_batch_dir = dir.path().to_string_lossy().into_owned();
    let engine = Arc::new(IdentificationEngine::new(
        config,
        Arc::new(InMemoryProfileStore::new()),
    ));
    let ctx = Arc::new(engine.new_context());

    let (handle, worker) =
        IngestionWorker::spawn(engine, ctx, Arc::new(TelemetryHub::default()));
    let mut outcomes = handle.subscribe();

    // No session is active, so this one fails during processing
    handle
        .submit(BatchPayload::calibration("pump", vec![tone_frame(&[520], 0)]))
        .unwrap();
    handle
        .submit(BatchPayload::live(vec![tone_frame(&[520], 0)]))
        .unwrap();

    let malformed = BatchPayload {
        mode: "bogus".to_string(),
        machine_id: None,
        frames: vec![tone_frame(&[520], 0)],
    };
    assert!(matches!(
        handle.submit(malformed),
        Err(DetectionError::UnknownMode { .. })
    ));
    drop(handle);

    let received: Vec<IngestOutcome> = outcomes.by_ref().collect().await;
    worker.join().await.unwrap();

    assert_eq!(received.len(), 1);
    assert!(matches!(received[0], IngestOutcome::Live(_)));
}
