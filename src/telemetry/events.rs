//! Telemetry event types describing ingestion and detection activity
//! exposed to the CLI and verdict subscribers.

use serde::{Deserialize, Serialize};

/// Which path a batch went through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Calibration,
    Live,
}

/// Diagnostic error codes surfaced via telemetry metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    MalformedBatch,
    QueueFull,
    ProcessingFailed,
    PersistFailed,
}

/// Metric events covering batch throughput, detections and queue pressure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    BatchProcessed {
        kind: BatchKind,
        frame_count: usize,
        processing_ms: f32,
    },
    Latency {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    Detection {
        raw_count: usize,
        stable_count: usize,
        near_miss_count: usize,
        amplitude_anomaly: bool,
    },
    QueueOccupancy {
        percent: f32,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
}
