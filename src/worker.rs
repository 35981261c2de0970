// IngestionWorker - asynchronous batch queue in front of the engine
//
// `IngestHandle::submit` validates a payload and queues it without waiting
// for processing, so producers get an acknowledgment immediately. A single
// consumer task drains the queue in order, runs each batch through the
// engine and broadcasts the outcome. Batches that cannot be queued or
// processed are written to the failed-batch directory. When a frame log is
// configured, the frames of every processed batch are appended to it on the
// blocking pool, after the producer has long been acknowledged.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::context::DetectionContext;
use crate::engine::{IdentificationEngine, IngestOutcome, ProcessedBatch};
use crate::error::{log_detection_error, DetectionError, ErrorCode};
use crate::ingest::{Batch, BatchPayload};
use crate::storage::{FailedBatchWriter, FrameLog, FrameRecord};
use crate::telemetry::{DiagnosticError, TelemetryHub};

/// Stream of outcomes; lagged receivers skip the outcomes they missed
pub type OutcomeStream = Pin<Box<dyn Stream<Item = IngestOutcome> + Send>>;

/// Acknowledgment returned as soon as a batch is queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    /// Batches waiting in the queue, including this one
    pub queue_depth: usize,
}

struct QueuedBatch {
    payload: BatchPayload,
    batch: Batch,
}

/// Shared pieces used by both the handle and the consumer task
struct WorkerShared {
    outcomes: broadcast::Sender<IngestOutcome>,
    failed: FailedBatchWriter,
    frame_log: Option<FrameLog>,
    telemetry: Arc<TelemetryHub>,
    capacity: usize,
}

impl WorkerShared {
    /// Persist a payload without blocking the async runtime
    fn persist_failed(self: &Arc<Self>, payload: BatchPayload) {
        let shared = Arc::clone(self);
        let write = move || {
            if let Err(err) = shared.failed.write(&payload) {
                log::error!("[IngestionWorker] Could not persist failed batch: {}", err);
                shared
                    .telemetry
                    .record_error(DiagnosticError::PersistFailed, err.to_string());
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }

    fn record_queue_depth(&self, depth: usize) {
        self.telemetry
            .record_queue_occupancy(depth as f32 / self.capacity as f32 * 100.0);
    }

    /// Append frame records on the blocking pool
    ///
    /// Returns the task handle so the consumer can wait for pending writes
    /// before it exits.
    fn record_frames(self: &Arc<Self>, records: Vec<FrameRecord>) -> Option<JoinHandle<()>> {
        if records.is_empty() || self.frame_log.is_none() {
            return None;
        }
        let shared = Arc::clone(self);
        Some(tokio::task::spawn_blocking(move || {
            let Some(frame_log) = shared.frame_log.as_ref() else {
                return;
            };
            if let Err(err) = frame_log.append(&records) {
                log::error!("[IngestionWorker] Could not append to frame log: {}", err);
                shared
                    .telemetry
                    .record_error(DiagnosticError::PersistFailed, err.to_string());
            }
        }))
    }
}

/// Cloneable producer side of the ingestion queue
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<QueuedBatch>,
    shared: Arc<WorkerShared>,
}

impl IngestHandle {
    /// Validate and queue a batch
    ///
    /// # Returns
    /// `SubmitAck` with the current queue depth; processing happens later
    ///
    /// # Errors
    /// - `MalformedBatch` / `UnknownMode` if the payload is invalid
    /// - `QueueFull` if the queue is at capacity; the batch is persisted
    /// - `WorkerStopped` if the consumer task has exited
    pub fn submit(&self, payload: BatchPayload) -> Result<SubmitAck, DetectionError> {
        let batch = Batch::try_from(payload.clone()).inspect_err(|err| {
            log_detection_error(err, "IngestionWorker", "submit");
            self.shared
                .telemetry
                .record_error(DiagnosticError::MalformedBatch, err.message());
        })?;

        match self.tx.try_send(QueuedBatch { payload, batch }) {
            Ok(()) => {
                let depth = self.queue_depth();
                self.shared.record_queue_depth(depth);
                Ok(SubmitAck { queue_depth: depth })
            }
            Err(mpsc::error::TrySendError::Full(queued)) => {
                let err = DetectionError::QueueFull;
                log_detection_error(&err, "IngestionWorker", "submit");
                self.shared
                    .telemetry
                    .record_error(DiagnosticError::QueueFull, err.message());
                self.shared.persist_failed(queued.payload);
                log::warn!(
                    "[IngestionWorker] Rejected batch saved under {:?}",
                    self.failed_batch_dir()
                );
                Err(err)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let err = DetectionError::WorkerStopped;
                log_detection_error(&err, "IngestionWorker", "submit");
                Err(err)
            }
        }
    }

    /// Batches currently waiting to be processed
    pub fn queue_depth(&self) -> usize {
        self.shared.capacity - self.tx.capacity()
    }

    /// Directory receiving batches that could not be queued or processed
    pub fn failed_batch_dir(&self) -> &Path {
        self.shared.failed.dir()
    }

    /// Subscribe to outcomes published after this call
    pub fn subscribe(&self) -> OutcomeStream {
        let receiver = self.shared.outcomes.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
            match result {
                Ok(outcome) => Some(outcome),
                Err(lagged) => {
                    tracing::warn!("[IngestionWorker] Subscriber lagged: {}", lagged);
                    None
                }
            }
        });
        Box::pin(stream)
    }
}

/// Consumer task owning the engine side of the queue
pub struct IngestionWorker {
    task: JoinHandle<()>,
}

impl IngestionWorker {
    /// Spawn the consumer on the current tokio runtime
    ///
    /// The worker runs until every `IngestHandle` has been dropped and the
    /// queue is drained.
    pub fn spawn(
        engine: Arc<IdentificationEngine>,
        ctx: Arc<DetectionContext>,
        telemetry: Arc<TelemetryHub>,
    ) -> (IngestHandle, IngestionWorker) {
        let ingestion = &engine.config().ingestion;
        let capacity = ingestion.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (outcomes, _) = broadcast::channel(ingestion.broadcast_capacity.max(1));

        let shared = Arc::new(WorkerShared {
            outcomes,
            failed: FailedBatchWriter::new(&ingestion.failed_batch_dir),
            frame_log: ingestion.frame_log_path.as_ref().map(FrameLog::new),
            telemetry,
            capacity,
        });

        let task = tokio::spawn(run(engine, ctx, Arc::clone(&shared), rx));
        tracing::info!("[IngestionWorker] Started (queue capacity {})", capacity);

        (
            IngestHandle { tx, shared },
            IngestionWorker { task },
        )
    }

    /// Wait for the worker to drain and exit
    ///
    /// # Errors
    /// `WorkerStopped` if the task panicked or was cancelled
    pub async fn join(self) -> Result<(), DetectionError> {
        self.task.await.map_err(|err| {
            tracing::error!("[IngestionWorker] Task ended abnormally: {}", err);
            DetectionError::WorkerStopped
        })
    }

    /// Stop immediately, dropping queued batches
    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn run(
    engine: Arc<IdentificationEngine>,
    ctx: Arc<DetectionContext>,
    shared: Arc<WorkerShared>,
    mut rx: mpsc::Receiver<QueuedBatch>,
) {
    let mut processed: u64 = 0;
    let mut pending_writes: Vec<JoinHandle<()>> = Vec::new();

    while let Some(QueuedBatch { payload, batch }) = rx.recv().await {
        shared.record_queue_depth(rx.len());
        let started = Instant::now();
        let frame_count = batch.frame_count();

        match engine.process_batch(&ctx, batch) {
            Ok(ProcessedBatch { outcome, records }) => {
                processed += 1;
                pending_writes.retain(|handle| !handle.is_finished());
                pending_writes.extend(shared.record_frames(records));
                let elapsed_ms = started.elapsed().as_secs_f32() * 1000.0;
                shared
                    .telemetry
                    .record_batch(&outcome, frame_count, elapsed_ms);

                if let IngestOutcome::Live(verdict) = &outcome {
                    tracing::info!(
                        "[IngestionWorker] Batch {}: {} frames, raw={:?}, stable={:?}",
                        processed,
                        frame_count,
                        verdict.raw_detected,
                        verdict.stable_detected
                    );
                }

                // No subscribers is not an error
                let _ = shared.outcomes.send(outcome);
            }
            Err(err) => {
                tracing::error!("[IngestionWorker] Batch processing failed: {}", err);
                shared
                    .telemetry
                    .record_error(DiagnosticError::ProcessingFailed, err.message());
                shared.persist_failed(payload);
            }
        }
    }

    for handle in pending_writes {
        if let Err(err) = handle.await {
            tracing::error!("[IngestionWorker] Frame log write task failed: {}", err);
        }
    }

    tracing::info!(
        "[IngestionWorker] Queue closed after {} processed batches",
        processed
    );
}
