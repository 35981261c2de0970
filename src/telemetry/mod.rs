//! Ingestion telemetry collector and helpers.
//!
//! The collector multiplexes batch throughput, detection counts, queue
//! occupancy and error events into a bounded history plus async broadcast
//! stream. A hub is owned by whoever runs the ingestion worker.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::engine::{DetectionVerdict, IngestOutcome};

pub mod events;

pub use events::{BatchKind, DiagnosticError, MetricEvent};

/// Point-in-time copy of the retained events and counters
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Telemetry must never take the worker down, so a poisoned lock is reused.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bounded event log; the oldest entry is evicted first
struct EventLog {
    events: VecDeque<MetricEvent>,
    capacity: usize,
    published: u64,
    evicted: u64,
}

impl EventLog {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            published: 0,
            evicted: 0,
        }
    }

    fn append(&mut self, event: MetricEvent) {
        self.published += 1;
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }
}

/// Fans metric events out to live subscribers and keeps a short log
pub struct TelemetryCollector {
    sender: broadcast::Sender<MetricEvent>,
    log: Mutex<EventLog>,
}

impl TelemetryCollector {
    pub fn new(channel_capacity: usize, history_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            sender,
            log: Mutex::new(EventLog::with_capacity(history_capacity)),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        lock_or_recover(&self.log).append(event.clone());
        // Nobody listening is fine; the log still has it
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let log = lock_or_recover(&self.log);
        TelemetrySnapshot {
            recent: log.events.iter().cloned().collect(),
            total_events: log.published,
            dropped_events: log.evicted,
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Rolling batch processing times, in ms
struct LatencyWindow {
    samples_ms: VecDeque<f32>,
    window: usize,
}

impl LatencyWindow {
    fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples_ms: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Add a sample and summarize the window as a `Latency` event
    fn record(&mut self, processing_ms: f32) -> MetricEvent {
        while self.samples_ms.len() >= self.window {
            self.samples_ms.pop_front();
        }
        self.samples_ms.push_back(processing_ms.max(0.0));

        let sample_count = self.samples_ms.len();
        let total: f32 = self.samples_ms.iter().sum();
        MetricEvent::Latency {
            avg_ms: total / sample_count as f32,
            max_ms: self.samples_ms.iter().fold(0.0_f32, |acc, &v| acc.max(v)),
            sample_count,
        }
    }
}

/// Hub wrapping the collector plus derived gauges.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    latency: Mutex<LatencyWindow>,
    last_queue_percent: Mutex<Option<f32>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, latency_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            latency: Mutex::new(LatencyWindow::new(latency_window)),
            last_queue_percent: Mutex::new(None),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    /// Record one processed batch and, for live batches, its verdict
    pub fn record_batch(
        &self,
        outcome: &IngestOutcome,
        frame_count: usize,
        processing_ms: f32,
    ) {
        let kind = match outcome {
            IngestOutcome::Calibration(_) => BatchKind::Calibration,
            IngestOutcome::Live(_) => BatchKind::Live,
        };
        self.collector.publish(MetricEvent::BatchProcessed {
            kind,
            frame_count,
            processing_ms,
        });

        let latency = lock_or_recover(&self.latency).record(processing_ms);
        self.collector.publish(latency);

        if let IngestOutcome::Live(verdict) = outcome {
            self.record_verdict(verdict);
        }
    }

    fn record_verdict(&self, verdict: &DetectionVerdict) {
        self.collector.publish(MetricEvent::Detection {
            raw_count: verdict.raw_detected.len(),
            stable_count: verdict.stable_detected.len(),
            near_miss_count: verdict.near_miss.len(),
            amplitude_anomaly: verdict.amplitude_anomaly,
        });
    }

    /// Queue fill gauge; changes under 2.5 points are not re-emitted
    pub fn record_queue_occupancy(&self, percent: f32) {
        let normalized = percent.clamp(0.0, 100.0);
        let mut last = lock_or_recover(&self.last_queue_percent);

        let should_emit = last
            .map(|previous| (previous - normalized).abs() >= 2.5)
            .unwrap_or(true);

        if should_emit {
            *last = Some(normalized);
            self.collector
                .publish(MetricEvent::QueueOccupancy { percent: normalized });
        }
    }

    pub fn record_error(&self, code: DiagnosticError, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Error {
            code,
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}
