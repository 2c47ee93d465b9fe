//! 🚀 slx-cli — the front door, the bouncer, the maitre d' of slx.
//!
//! 🎬 *[narrator voice]* "It all started with a spreadsheet someone emailed to a bucket..."
//! 📦 This binary is the thin wrapper: parse flags, load config, set up logging,
//! then let the library do the heavy lifting. Like a manager. 🦆

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use clap::Parser;
use slx::app_config::{AppConfig, ConfigOverrides, load_config};
use slx::{ConversionError, supervisors::describe_upload};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 📗➡️🪣 Convert one sheet of a workbook in S3 into a fully quoted CSV in S3.
#[derive(Debug, Parser)]
#[command(name = "slx", version, about)]
struct Cli {
    /// s3://bucket/path/to/workbook.xlsx
    #[arg(long = "input-s3-path")]
    input_s3_path: Option<String>,

    /// s3://bucket/dir/ or s3://bucket/dir/file.csv (default: next to the input)
    #[arg(long = "output-s3-path")]
    output_s3_path: Option<String>,

    /// Sheet name, or a 0-based position (default: the first sheet)
    #[arg(long = "sheet-name")]
    sheet_name: Option<String>,

    /// Rows read per chunk (default: 10000)
    #[arg(long = "chunk-size")]
    chunk_size: Option<usize>,

    /// Also write a daily log file into this directory
    #[arg(long = "log-dir")]
    log_dir: Option<PathBuf>,

    /// TOML config file; flags win over it, it wins over SLX_* env vars
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            input: self.input_s3_path.clone(),
            output: self.output_s3_path.clone(),
            sheet: self.sheet_name.clone(),
            chunk_size_rows: self.chunk_size,
            log_dir: self.log_dir.clone(),
        }
    }
}

/// 📅 `excel_conversion_YYYYMMDD.log`, dated today, local time.
fn log_file_name(today: chrono::NaiveDate) -> String {
    format!("excel_conversion_{}.log", today.format("%Y%m%d"))
}

/// 📡 stdout always, plus the daily file when a log dir is configured.
fn init_tracing(log_dir: Option<&Path>) -> Result<()> {
    let the_file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("💀 Could not create log dir '{}'", dir.display()))?;
            let the_path = dir.join(log_file_name(chrono::Local::now().date_naive()));
            let the_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&the_path)
                .with_context(|| format!("💀 Could not open log file '{}'", the_path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(the_file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(the_file_layer)
        .try_init()
        .context("💀 Could not install the tracing subscriber")?;
    Ok(())
}

fn load(cli: &Cli) -> Result<AppConfig> {
    if let Some(path) = &cli.config {
        // 🔒 Validate the config file exists before we get too emotionally attached
        let exists = path.try_exists().with_context(|| {
            format!("💀 Could not check whether '{}' exists", path.display())
        })?;
        if !exists {
            bail!(
                "💀 Configuration file not found at '{}'. Relative paths resolve against the cwd.",
                path.display()
            );
        }
    }
    load_config(cli.config.as_deref(), cli.overrides())
}

/// 🧅 Peel the onion of sadness, one layer at a time.
fn report_failure(err: &ConversionError) {
    error!("💀 conversion failed: {}", err.kind);
    match err.row_offset {
        Some(offset) => error!("📍 failed while processing data rows from offset {}", offset),
        None => error!("📍 failed before any rows were read"),
    }
    error!("🪣 upload session: {}", err.disposition);

    let mut the_vibes_are_giving_connection_issues = false;
    let mut the_cause: Option<&(dyn std::error::Error + 'static)> = Some(&*err.cause);
    while let Some(cause) = the_cause {
        error!("⚠️  cause: {}", cause);
        let the_text = cause.to_string();
        if the_text.contains("dispatch failure")
            || the_text.contains("connection refused")
            || the_text.contains("Connection refused")
            || the_text.contains("dns error")
        {
            the_vibes_are_giving_connection_issues = true;
        }
        the_cause = cause.source();
    }

    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: the object store isn't reachable. Check the region, the endpoint_url \
             (MinIO/LocalStack users: is it running?), and your network. ☕"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let the_cli = Cli::parse();

    let app_config = match load(&the_cli) {
        Ok(config) => config,
        Err(err) => {
            // -- no config means no log dir; stdout will have to do
            init_tracing(None)?;
            error!("💀 could not load the configuration: {:#}", err);
            std::process::exit(1);
        }
    };
    init_tracing(app_config.logging.log_dir.as_deref())?;

    match slx::run(app_config).await {
        Ok(report) => {
            info!("🎯 output: {}", report.output);
            info!("📊 total rows: {}", report.total_rows);
            info!("📦 written as: {}", describe_upload(&report.upload));
            Ok(())
        }
        Err(err) => {
            report_failure(&err);
            // 🗑️ Exit with prejudice. Process exitus maximus.
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_flags_become_overrides() {
        let the_cli = Cli::try_parse_from([
            "slx",
            "--input-s3-path",
            "s3://bucket/in.xlsx",
            "--sheet-name",
            "Summary",
            "--chunk-size",
            "500",
        ])
        .expect("💀");
        let the_overrides = the_cli.overrides();
        assert_eq!(the_overrides.input.as_deref(), Some("s3://bucket/in.xlsx"));
        assert_eq!(the_overrides.sheet.as_deref(), Some("Summary"));
        assert_eq!(the_overrides.chunk_size_rows, Some(500));
        assert_eq!(the_overrides.output, None);
    }

    #[test]
    fn the_one_where_the_log_file_is_named_after_the_day() {
        let the_day = chrono::NaiveDate::from_ymd_opt(2024, 3, 7).expect("💀");
        assert_eq!(log_file_name(the_day), "excel_conversion_20240307.log");
    }
}
