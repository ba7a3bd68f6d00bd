//! fmv-ingest: UDP full-motion video ingest service.
//!
//! Receives an MPEG-TS stream, writes it out in frame-aligned chunks and
//! derives an attribute sidecar for each chunk from the embedded KLV
//! telemetry.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

mod error;
mod filename;
mod logging;
mod monitor;
mod output;

use fmv_core::buffer::{BufferConfig, RolloverCondition};
use fmv_core::pipeline::{WindowConfig, SUBSAMPLE_COUNT};
use filename::FilenameTemplate;
use monitor::{MonitorConfig, SessionConfig};

const DEFAULT_LISTEN: &str = "0.0.0.0:15000";
const DEFAULT_OUTPUT_DIR: &str = "fmv-output";
const DEFAULT_CONFIG_FILE: &str = "fmv-ingest.toml";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_RETENTION_DAYS: u64 = 7;
const DEFAULT_ROLLOVER_MEGABYTES: u64 = 10;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;

/// fmv-ingest - UDP full-motion video ingest service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to receive the transport stream on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Directory chunks and sidecars are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output file name template, `%{date=<strftime>}` tokens are expanded
    #[arg(long)]
    filename_template: Option<String>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Roll over once a chunk holds this many megabytes
    #[arg(long)]
    rollover_megabytes: Option<u64>,

    /// Roll over once a chunk is this many seconds old
    #[arg(long)]
    rollover_seconds: Option<u64>,

    /// Flush the pending chunk after this many seconds without data
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Directory where log files are stored
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files
    #[arg(long)]
    log_retention_days: Option<u64>,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    monitor: MonitorSection,
    #[serde(default)]
    rollover: RolloverSection,
    #[serde(default)]
    buffer: BufferSection,
    #[serde(default)]
    klv: KlvSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct MonitorSection {
    listen: Option<SocketAddr>,
    output_dir: Option<PathBuf>,
    filename_template: Option<String>,
    idle_timeout_secs: Option<u64>,
    stats_interval_secs: Option<u64>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct RolloverSection {
    megabytes: Option<u64>,
    elapsed_secs: Option<u64>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct BufferSection {
    max_frameset_size: Option<usize>,
    max_incomplete_frame_bytes: Option<usize>,
    temp_dir: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct KlvSection {
    subsample_count: Option<usize>,
    distance_tolerance: Option<f64>,
    #[serde(default)]
    classification: Vec<ClassificationEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct ClassificationEntry {
    code: u8,
    name: String,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<PathBuf>,
    retention_days: Option<u64>,
    level: Option<String>,
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Megabyte and elapsed-time thresholds, either one alone or OR-combined.
fn rollover_condition(
    megabytes: Option<u64>,
    elapsed_secs: Option<u64>,
) -> Result<RolloverCondition, Box<dyn std::error::Error>> {
    let elapsed = elapsed_secs.map(|secs| RolloverCondition::ElapsedTime(Duration::from_secs(secs)));
    let condition = match (megabytes, elapsed) {
        (Some(mb), Some(elapsed)) => RolloverCondition::megabyte_count(mb)?.or(elapsed),
        (None, Some(elapsed)) => elapsed,
        (Some(mb), None) => RolloverCondition::megabyte_count(mb)?,
        (None, None) => RolloverCondition::megabyte_count(DEFAULT_ROLLOVER_MEGABYTES)?,
    };
    Ok(condition)
}

/// Merge the command line over the configuration file over the defaults.
fn monitor_config(args: &Args, file: &ConfigFile) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let listen_addr = match args.listen.or(file.monitor.listen) {
        Some(addr) => addr,
        None => DEFAULT_LISTEN.parse()?,
    };

    let rollover = rollover_condition(
        args.rollover_megabytes.or(file.rollover.megabytes),
        args.rollover_seconds.or(file.rollover.elapsed_secs),
    )?;

    let defaults = BufferConfig::default();
    let buffer = BufferConfig {
        max_frameset_size: file.buffer.max_frameset_size.unwrap_or(defaults.max_frameset_size),
        max_incomplete_frame_bytes: file
            .buffer
            .max_incomplete_frame_bytes
            .unwrap_or(defaults.max_incomplete_frame_bytes),
        temp_dir: file.buffer.temp_dir.clone(),
    };

    let mut window = WindowConfig::default();
    if let Some(count) = file.klv.subsample_count {
        window.set(SUBSAMPLE_COUNT, count);
    }

    let template = args
        .filename_template
        .clone()
        .or_else(|| file.monitor.filename_template.clone())
        .map(FilenameTemplate::new)
        .unwrap_or_default();

    Ok(MonitorConfig {
        listen_addr,
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| file.monitor.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        filename_template: template,
        idle_timeout: Duration::from_secs(
            args.idle_timeout
                .or(file.monitor.idle_timeout_secs)
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
        ),
        session: SessionConfig {
            buffer,
            rollover,
            window,
            distance_tolerance: file.klv.distance_tolerance,
            classifications: file
                .klv
                .classification
                .iter()
                .map(|entry| (entry.code, entry.name.clone()))
                .collect(),
            stats_interval: Duration::from_secs(
                file.monitor
                    .stats_interval_secs
                    .unwrap_or(DEFAULT_STATS_INTERVAL_SECS),
            ),
        },
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        },
        None => ConfigFile::default(),
    };

    let log_dir = args
        .log_dir
        .clone()
        .or_else(|| file_config.logging.log_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
    let log_retention_days = args
        .log_retention_days
        .or(file_config.logging.retention_days)
        .unwrap_or(DEFAULT_RETENTION_DAYS);
    let _log_guard = logging::init_logging(
        &log_dir,
        log_retention_days,
        args.verbose,
        file_config.logging.level.as_deref(),
    )?;

    let config = monitor_config(&args, &file_config)?;

    info!("fmv-ingest starting...");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Output directory: {:?}", config.output_dir);
    info!("  Rollover: {}", config.session.rollover);
    info!("  Idle timeout: {:?}", config.idle_timeout);

    if let Err(e) = monitor::run(config).await {
        error!("Monitor stopped: {}", e);
        return Err(e.into());
    }

    info!("fmv-ingest stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[monitor]
listen = "127.0.0.1:16000"
output_dir = "/var/lib/fmv"
filename_template = "uav-%{date=%Y%m%d}"
idle_timeout_secs = 10

[rollover]
megabytes = 25
elapsed_secs = 300

[buffer]
max_frameset_size = 500

[klv]
subsample_count = 20
distance_tolerance = 0.0001

[[klv.classification]]
code = 6
name = "COSMIC TOP SECRET"

[logging]
level = "debug"
"#;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("fmv-ingest").chain(extra.iter().copied()))
    }

    #[test]
    fn test_config_file_sections() {
        let file: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let config = monitor_config(&args(&[]), &file).unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:16000".parse().unwrap());
        assert_eq!(config.output_dir, PathBuf::from("/var/lib/fmv"));
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert_eq!(
            config.session.rollover,
            RolloverCondition::ByteCount(25_000_000).or(RolloverCondition::ElapsedTime(Duration::from_secs(300)))
        );
        assert_eq!(config.session.buffer.max_frameset_size, 500);
        assert_eq!(config.session.window.subsample_count(), Some(20));
        assert_eq!(config.session.classifications, vec![(6, "COSMIC TOP SECRET".to_string())]);
        assert_eq!(file.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_command_line_wins() {
        let file: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let config = monitor_config(
            &args(&["--listen", "0.0.0.0:17000", "--rollover-seconds", "60", "--rollover-megabytes", "1"]),
            &file,
        )
        .unwrap();

        assert_eq!(config.listen_addr.port(), 17000);
        assert_eq!(
            config.session.rollover,
            RolloverCondition::ByteCount(1_000_000).or(RolloverCondition::ElapsedTime(Duration::from_secs(60)))
        );
    }

    #[test]
    fn test_defaults() {
        let config = monitor_config(&args(&[]), &ConfigFile::default()).unwrap();
        assert_eq!(config.listen_addr.port(), 15000);
        assert_eq!(config.session.rollover, RolloverCondition::ByteCount(10_000_000));
        assert!(config.session.classifications.is_empty());
        assert!(rollover_condition(Some(0), None).is_err());
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(toml::from_str::<ConfigFile>("[server]\nlisten = \"x\"\n").is_err());
    }
}
