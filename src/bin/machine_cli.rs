use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use machine_listener::calibration::MachineProfile;
use machine_listener::error::CalibrationError;
use machine_listener::storage::{FrameLog, JsonFileProfileStore};
use machine_listener::telemetry::{DiagnosticError, MetricEvent, TelemetryHub};
use machine_listener::{
    AppConfig, Batch, BatchPayload, EngineError, FramePayload, IdentificationEngine,
    IngestionWorker,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "machine_cli",
    about = "Calibrate machine profiles and replay spectral batches"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/machine_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Profile store document
    #[arg(long, default_value = "data/profiles.json")]
    store: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build and store a profile from a JSON array of calibration frames
    Calibrate {
        #[arg(long)]
        machine: String,
        #[arg(long)]
        frames: PathBuf,
        /// Append the calibration frames to this JSONL frame log
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Replay a JSONL file of batches and print one outcome per line
    Detect {
        #[arg(long)]
        input: PathBuf,
        /// Append every processed frame to this JSONL frame log
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Rebuild and store a profile from a calibration session in a frame log
    Rebuild {
        #[arg(long)]
        machine: String,
        #[arg(long)]
        log: PathBuf,
        /// Timestamp of the first frame of the session, in ms
        #[arg(long)]
        since_ms: u64,
    },
    /// Inspect or delete stored profiles
    Profiles {
        #[command(subcommand)]
        action: ProfilesAction,
    },
}

#[derive(Subcommand, Debug)]
enum ProfilesAction {
    /// Print every stored profile
    List,
    /// Delete the profile of a machine
    Delete {
        #[arg(long)]
        machine: String,
    },
}

fn main() -> ExitCode {
    machine_listener::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Calibrate {
            machine,
            frames,
            record,
        } => run_calibrate(
            open_engine(config, &cli.store)?,
            &machine,
            &frames,
            record.as_deref(),
        ),
        Commands::Detect { input, record } => {
            run_detect(config, &cli.store, &input, record.as_deref())
        }
        Commands::Rebuild {
            machine,
            log,
            since_ms,
        } => run_rebuild(open_engine(config, &cli.store)?, &machine, &log, since_ms),
        Commands::Profiles { action } => {
            let engine = open_engine(config, &cli.store)?;
            match action {
                ProfilesAction::List => run_list(&engine),
                ProfilesAction::Delete { machine } => run_delete(&engine, &machine),
            }
        }
    }
}

fn open_engine(config: AppConfig, store_path: &Path) -> Result<IdentificationEngine> {
    let store = JsonFileProfileStore::open(store_path)
        .with_context(|| format!("opening profile store {}", store_path.display()))?;
    tracing::info!("[machine_cli] Profile store: {}", store.path().display());
    Ok(IdentificationEngine::new(config, Arc::new(store)))
}

fn run_calibrate(
    engine: IdentificationEngine,
    machine: &str,
    frames_path: &Path,
    record: Option<&Path>,
) -> Result<ExitCode> {
    let contents = fs::read_to_string(frames_path)
        .with_context(|| format!("reading {}", frames_path.display()))?;
    let frames: Vec<FramePayload> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing frames in {}", frames_path.display()))?;

    let ctx = engine.new_context();
    let batch = Batch::try_from(BatchPayload::calibration(machine, frames))
        .context("validating calibration frames")?;

    engine.start_calibration(&ctx, machine)?;
    let processed = engine.process_batch(&ctx, batch)?;
    if let Some(log_path) = record {
        FrameLog::new(log_path)
            .append(&processed.records)
            .with_context(|| format!("appending to frame log {}", log_path.display()))?;
    }
    eprintln!("{}", serde_json::to_string(&processed.outcome)?);
    let session = engine.stop_calibration(&ctx)?;

    report_profile(engine.build_profile(session))
}

fn run_rebuild(
    engine: IdentificationEngine,
    machine: &str,
    log_path: &Path,
    since_ms: u64,
) -> Result<ExitCode> {
    let duration_ms = engine.config().calibration.session_duration_ms;
    let session = FrameLog::new(log_path)
        .read_session(machine, since_ms, duration_ms)
        .with_context(|| format!("reading frame log {}", log_path.display()))?;
    eprintln!(
        "{} frames for {} between {} and {} ms",
        session.frames().len(),
        machine,
        session.started_at_ms(),
        session.ended_at_ms()
    );

    report_profile(engine.build_profile(session))
}

/// Print a built profile, or map a rejection to exit code 2
fn report_profile(built: Result<MachineProfile, EngineError>) -> Result<ExitCode> {
    match built {
        Ok(profile) => {
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(ExitCode::from(0))
        }
        Err(EngineError::Calibration(
            err @ (CalibrationError::InsufficientFrames { .. }
            | CalibrationError::ProfileRejected { .. }),
        )) => {
            eprintln!("{err}");
            Ok(ExitCode::from(2))
        }
        Err(err) => Err(err).context("building profile"),
    }
}

fn run_detect(
    mut config: AppConfig,
    store_path: &Path,
    input: &Path,
    record: Option<&Path>,
) -> Result<ExitCode> {
    let contents =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let payloads = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<BatchPayload>(line)
                .with_context(|| format!("parsing batch on line {}", index + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    // A replay submits everything up front, so the queue must hold it all
    config.ingestion.queue_capacity = config.ingestion.queue_capacity.max(payloads.len());
    config.ingestion.broadcast_capacity = config.ingestion.broadcast_capacity.max(payloads.len());
    if let Some(path) = record {
        config.ingestion.frame_log_path = Some(path.to_string_lossy().into_owned());
    }
    let engine = Arc::new(open_engine(config, store_path)?);
    let ctx = Arc::new(engine.new_context());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    runtime.block_on(async move {
        let telemetry = Arc::new(TelemetryHub::default());
        let (handle, worker) = IngestionWorker::spawn(engine, ctx, Arc::clone(&telemetry));
        let mut outcomes = handle.subscribe();

        let mut accepted = 0usize;
        for (index, payload) in payloads.into_iter().enumerate() {
            match handle.submit(payload) {
                Ok(_) => accepted += 1,
                Err(err) => eprintln!("batch {}: {}", index + 1, err),
            }
        }
        let failed_dir = handle.failed_batch_dir().to_path_buf();
        drop(handle);

        while let Some(outcome) = outcomes.next().await {
            println!("{}", serde_json::to_string(&outcome)?);
        }
        worker.join().await?;

        let snapshot = telemetry.snapshot();
        eprintln!(
            "{} batches accepted, {} telemetry events",
            accepted, snapshot.total_events
        );
        let failures = snapshot
            .recent
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    MetricEvent::Error {
                        code: DiagnosticError::QueueFull | DiagnosticError::ProcessingFailed,
                        ..
                    }
                )
            })
            .count();
        if failures > 0 {
            eprintln!("{} batches failed; see {}", failures, failed_dir.display());
        }
        Ok::<_, anyhow::Error>(ExitCode::from(0))
    })
}

fn run_list(engine: &IdentificationEngine) -> Result<ExitCode> {
    let profiles = engine.profiles()?;
    let report = ProfileListPayload {
        profile_count: profiles.len(),
        profiles: &profiles,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn run_delete(engine: &IdentificationEngine, machine: &str) -> Result<ExitCode> {
    if engine.delete_profile(machine)? {
        println!("Deleted profile {machine}");
        Ok(ExitCode::from(0))
    } else {
        println!("No profile stored for {machine}");
        Ok(ExitCode::from(2))
    }
}

#[derive(Serialize)]
struct ProfileListPayload<'a> {
    profile_count: usize,
    profiles: &'a [MachineProfile],
}
