// Machine Listener Core - acoustic multi-machine identification
// Calibrates narrowband machine signatures and recognizes them in live spectra

// Module declarations
pub mod analysis;
pub mod calibration;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod managers;
pub mod storage;
pub mod telemetry;
pub mod worker;

// Re-exports for convenience
pub use config::AppConfig;
pub use context::DetectionContext;
pub use engine::{DetectionVerdict, IdentificationEngine, IngestOutcome};
pub use error::{EngineError, ErrorCode};
pub use ingest::{Batch, BatchMode, BatchPayload, FramePayload};
pub use worker::{IngestHandle, IngestionWorker, SubmitAck};

/// Initialize the `tracing` subscriber for binaries and tests
///
/// `log` records from library modules are bridged into the same output,
/// which goes to stderr so stdout stays machine-readable. Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
