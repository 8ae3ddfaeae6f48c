//! fpsubmit - fingerprint an audio collection and submit it to AcoustID
//!
//! Scans the given directories, fingerprints every supported file that was
//! not submitted before, and submits the results in batches. While running,
//! type `pause`, `resume` or `cancel` (or `p`, `r`, `c`) on stdin; Ctrl+C
//! cancels.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fpsubmit::config::{CliOverrides, Settings, API_KEY_ENV};
use fpsubmit::models::{RunOutcome, RunSummary};
use fpsubmit::services::{
    AcoustIdClient, FileAnalyzer, FileScanner, Fingerprinter, MetadataExtractor, SubmissionLog,
};
use fpsubmit::{Orchestrator, RunController};
use fpsubmit_common::config::{
    default_config_path, load_toml_config, write_toml_config, TomlConfig,
};
use fpsubmit_common::events::{EventBus, SubmitEvent};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "fpsubmit")]
#[command(about = "Fingerprint audio files and submit them to AcoustID")]
#[command(version)]
struct Args {
    /// Directories to scan
    #[arg(required = true)]
    directories: Vec<PathBuf>,

    /// AcoustID user API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// TOML config file (default: platform config dir)
    #[arg(long, env = "FPSUBMIT_CONFIG")]
    config: Option<PathBuf>,

    /// Files analyzed concurrently
    #[arg(long, env = "FPSUBMIT_MAX_ACTIVE_FILES")]
    max_active_files: Option<usize>,

    /// Smallest batch submitted while analysis is running
    #[arg(long, env = "FPSUBMIT_MIN_BATCH")]
    min_batch: Option<usize>,

    /// Largest batch per request
    #[arg(long, env = "FPSUBMIT_MAX_BATCH")]
    max_batch: Option<usize>,

    /// Submission endpoint
    #[arg(long, env = "FPSUBMIT_SUBMIT_URL")]
    submit_url: Option<String>,

    /// Log of already submitted files
    #[arg(long, env = "FPSUBMIT_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Submit files without a MusicBrainz recording id
    #[arg(long)]
    allow_missing_mbid: bool,

    /// Store the resolved API key and limits in the config file
    #[arg(long)]
    save_config: bool,

    /// fpcalc binary used for fingerprinting
    #[arg(long, env = "FPSUBMIT_FPCALC", default_value = "fpcalc")]
    fpcalc: PathBuf,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api_key: self.api_key.clone(),
            submit_url: self.submit_url.clone(),
            max_active_files: self.max_active_files,
            min_batch_size: self.min_batch,
            max_batch_size: self.max_batch,
            log_file: self.log_file.clone(),
            require_mbid: self.allow_missing_mbid.then_some(false),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let toml_config = load_toml_config(&config_path)?;

    // RUST_LOG wins; otherwise scope the configured level to this workspace
    let default_filter = if toml_config.logging.level.contains('=') {
        toml_config.logging.level.clone()
    } else {
        format!(
            "fpsubmit={0},fpsubmit_common={0}",
            toml_config.logging.level
        )
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting fpsubmit {} (git {}, built {}, {})",
        fpsubmit::VERSION,
        fpsubmit::GIT_HASH,
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Config file: {}", config_path.display());

    let settings = Settings::resolve(&args.overrides(), &toml_config)
        .context("Invalid configuration")?;
    info!(
        submit_url = %settings.submit_url,
        max_active_files = settings.max_active_files,
        min_batch = settings.min_batch_size,
        max_batch = settings.max_batch_size,
        log_file = %settings.log_file.display(),
        "Settings resolved"
    );

    if args.save_config {
        let saved = TomlConfig {
            api_key: Some(settings.api_key.clone()),
            max_active_files: Some(settings.max_active_files),
            min_batch_size: Some(settings.min_batch_size),
            max_batch_size: Some(settings.max_batch_size),
            ..toml_config.clone()
        };
        write_toml_config(&saved, &config_path)?;
        info!("Saved settings to {}", config_path.display());
    }

    for dir in &args.directories {
        if !dir.is_dir() {
            anyhow::bail!("Not a directory: {}", dir.display());
        }
    }

    let submission_log = SubmissionLog::new(&settings.log_file);
    let scanner = FileScanner::new().with_submission_log(submission_log.clone());
    let analyzer = FileAnalyzer::new(
        MetadataExtractor::new(settings.require_mbid),
        Fingerprinter::new()
            .with_length(settings.fingerprint_length)
            .with_fpcalc_path(args.fpcalc.clone()),
    );
    let client = AcoustIdClient::new(settings.submit_url.clone())
        .context("Failed to initialize AcoustID client")?;

    let event_bus = EventBus::new(1000);
    let renderer = tokio::spawn(render_events(event_bus.subscribe()));

    let orchestrator = Orchestrator::new(
        settings.orchestrator_config(),
        Arc::new(scanner),
        Arc::new(analyzer),
        Arc::new(client),
        Arc::new(submission_log),
        event_bus,
    );
    let handle = orchestrator.start(args.directories.clone());

    let stdin_task = tokio::spawn(read_commands(handle.controller()));
    let signal_task = tokio::spawn(cancel_on_signal(handle.controller()));

    let summary = handle.wait().await.context("Run failed")?;

    stdin_task.abort();
    signal_task.abort();
    // Renderer ends when the bus closes with the orchestrator
    if let Err(e) = renderer.await {
        warn!("Event renderer failed: {}", e);
    }

    report(&summary);
    Ok(exit_code(&summary.outcome))
}

/// Log run events as they arrive
async fn render_events(mut rx: broadcast::Receiver<SubmitEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event display lagging, {} events skipped", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            SubmitEvent::StateChanged { new_state, .. } => info!("State: {}", new_state),
            SubmitEvent::DiscoveryStarted { directories } => {
                info!("Reading file list from {} directories", directories.len())
            }
            SubmitEvent::CurrentPathChanged { path } => info!("{}", path.display()),
            SubmitEvent::AnalysisStarted { file_count } => {
                info!("Fingerprinting {} files", file_count)
            }
            SubmitEvent::Progress { analyzed, total } => {
                info!("Analyzed {}/{}", analyzed, total)
            }
            SubmitEvent::FileFailed { path, reason } => {
                warn!("Skipping {}: {}", path.display(), reason)
            }
            SubmitEvent::SubmissionStarted { batch_size } => {
                info!("Submitting {} fingerprints", batch_size)
            }
            SubmitEvent::BatchSubmitted {
                batch_size,
                submitted_total,
            } => info!("Submitted {} ({} total)", batch_size, submitted_total),
            SubmitEvent::SubmissionRejected { message } => {
                warn!("Submission rejected: {}", message)
            }
            SubmitEvent::NetworkError { message } => error!("Network error: {}", message),
            SubmitEvent::AuthenticationError => {
                error!("Invalid API key. Get yours at {}", fpsubmit::config::API_KEY_URL)
            }
            SubmitEvent::NoFilesError => warn!("No new files found"),
            SubmitEvent::Finished { submitted, .. } => {
                info!("Finished, {} fingerprints submitted", submitted);
                break;
            }
        }
    }
}

/// Forward stdin commands to the run
async fn read_commands(controller: RunController) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        let result = match line.trim().to_lowercase().as_str() {
            "" => continue,
            "p" | "pause" => controller.pause(),
            "r" | "resume" => controller.resume(),
            "c" | "cancel" => controller.cancel(),
            other => {
                warn!("Unknown command '{}' (pause, resume, cancel)", other);
                continue;
            }
        };
        if result.is_err() {
            break;
        }
    }
}

/// Cancel on Ctrl+C or SIGTERM
async fn cancel_on_signal(controller: RunController) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, cancelling"),
        _ = terminate => info!("Received terminate signal, cancelling"),
    }
    let _ = controller.cancel();
}

fn report(summary: &RunSummary) {
    info!(
        outcome = ?summary.outcome,
        files = summary.total_files,
        analyzed = summary.analyzed,
        failed = summary.failed,
        submitted = summary.submitted,
        rejected = summary.rejected,
        elapsed_seconds = summary.elapsed_seconds,
        "Run summary"
    );
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Completed | RunOutcome::NoFiles => ExitCode::SUCCESS,
        RunOutcome::Cancelled => ExitCode::from(130),
        RunOutcome::AuthenticationFailed => ExitCode::from(3),
        RunOutcome::NetworkFailed(_) => ExitCode::from(4),
    }
}
