//! # beacon-locator
//!
//! Replays recorded BLE scan reports through the positioning service and
//! prints the resulting position estimates as JSON.
//!
//! ```text
//! beacon-locator --config config/beacon-locator.toml --scans scans.jsonl
//! beacon-locator --floor-plan config/cafeteria.toml --register receivers.json --scans scans.jsonl --show-rssi
//! ```
//!
//! Each line of the scan file is one ingestion payload. Unless `--now` is
//! given, the newest scan timestamp is used as the current time so that old
//! recordings still fall inside the estimation window.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use beacon_locator::api::{EstimateReport, PositioningService, RssiGroups};
use beacon_locator::processing::{parse_scan_payload, parse_timestamp, ScanObservation};
use beacon_locator::utils::{init_logging, LogLevel, SystemConfig};
use beacon_locator::validation::{ConfigError, Error, PersistenceError};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "beacon-locator")]
#[command(version, about = "BLE beacon positioning by RSSI multilateration")]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Floor-plan TOML document (overrides `paths.floor_plan`)
    #[arg(short, long)]
    floor_plan: Option<PathBuf>,

    /// Receiver registry JSON file (overrides `paths.receivers`)
    #[arg(short, long)]
    receivers: Option<PathBuf>,

    /// Calibration sample log (overrides `paths.calibration_log`)
    #[arg(long)]
    calibration_log: Option<PathBuf>,

    /// Receiver registration payload to apply before replaying scans
    #[arg(long)]
    register: Option<PathBuf>,

    /// JSON-lines file of scan reports
    #[arg(short, long)]
    scans: Option<PathBuf>,

    /// Evaluation time (RFC 3339). Defaults to the newest scan timestamp.
    #[arg(long)]
    now: Option<String>,

    /// Include the per-receiver RSSI groups in the output
    #[arg(long)]
    show_rssi: bool,

    /// Log level (overrides the configuration)
    #[arg(short, long)]
    log_level: Option<LogLevel>,
}

#[derive(Serialize)]
struct Output {
    scans_accepted: usize,
    scans_rejected: usize,
    valid_devices: usize,
    report: EstimateReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    rssi_groups: Option<RssiGroups>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "beacon-locator failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let mut config = match &cli.config {
        Some(path) => SystemConfig::load(path)?,
        None => SystemConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging);

    if cli.floor_plan.is_some() {
        config.paths.floor_plan = cli.floor_plan.clone();
    }
    if cli.receivers.is_some() {
        config.paths.receivers = cli.receivers.clone();
    }
    if cli.calibration_log.is_some() {
        config.paths.calibration_log = cli.calibration_log.clone();
    }

    let service = PositioningService::from_config(config)?;

    if let Some(path) = &cli.register {
        let body = read_file(path)?;
        let total = service.register_receivers(&body)?;
        info!(path = %path.display(), total, "receiver registration applied");
    }

    let (observations, scans_rejected) = match &cli.scans {
        Some(path) => read_scans(path)?,
        None => (Vec::new(), 0),
    };

    let now = match &cli.now {
        Some(text) => parse_timestamp(text).map_err(|reason| {
            ConfigError::invalid("--now", text, &reason.to_string())
        })?,
        None => observations
            .iter()
            .map(|o| o.timestamp)
            .max()
            .unwrap_or_else(Utc::now),
    };

    let scans_accepted = observations.len();
    for observation in observations {
        service.ingest(observation, now);
    }

    let output = Output {
        scans_accepted,
        scans_rejected,
        valid_devices: service.valid_device_count(now),
        report: service.estimate_positions(now),
        rssi_groups: cli.show_rssi.then(|| service.rssi_groups(now)),
    };
    print_json(&output)
}

fn read_file(path: &Path) -> Result<String, PersistenceError> {
    fs::read_to_string(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode every non-blank line; malformed lines are logged and counted
fn read_scans(path: &Path) -> Result<(Vec<ScanObservation>, usize), PersistenceError> {
    let text = read_file(path)?;
    let mut observations = Vec::new();
    let mut rejected = 0usize;

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_scan_payload(line) {
            Ok(observation) => observations.push(observation),
            Err(reason) => {
                warn!(line = index + 1, %reason, "scan rejected");
                rejected += 1;
            }
        }
    }

    info!(path = %path.display(), accepted = observations.len(), rejected, "scan file read");
    Ok((observations, rejected))
}

fn print_json(output: &Output) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(output).map_err(|source| PersistenceError::Json {
        path: PathBuf::from("<stdout>"),
        source,
    })?;
    println!("{}", text);
    Ok(())
}
