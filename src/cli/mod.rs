//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    config::{validate_target, validate_years, DownloadSettings, Settings},
    download::{RetryPolicy, DEFAULT_DATASET},
    error::ConfigError,
    interpolate::DEFAULT_MISSING_SENTINEL,
    output::OutputFormat,
    table::ConflictPolicy,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the target point from grid files already in the data directory
    Extract(ExtractArgs),
    /// Download monthly grid files from the archive, then extract them
    Download(DownloadArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Target latitude in degrees
    #[arg(long, env = "ERA5_LATITUDE", default_value_t = 41.14833299, allow_negative_numbers = true)]
    pub latitude: f64,

    /// Target longitude in degrees
    #[arg(long, env = "ERA5_LONGITUDE", default_value_t = -9.58166667, allow_negative_numbers = true)]
    pub longitude: f64,

    /// Directory holding the monthly grid files
    #[arg(long, default_value = "grib")]
    pub data_dir: PathBuf,

    /// Directory the table is written to
    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,

    /// YAML variable table replacing the built-in wave variables
    #[arg(long)]
    pub variables: Option<PathBuf>,

    /// Output format, may be repeated
    #[arg(long = "format", value_enum, default_value = "csv")]
    pub formats: Vec<OutputFormat>,

    /// Text written for missing values
    #[arg(long, default_value = "NaN")]
    pub missing_marker: String,

    /// Grid value treated as missing
    #[arg(long, default_value_t = DEFAULT_MISSING_SENTINEL, allow_negative_numbers = true)]
    pub missing_sentinel: f64,

    /// Which value wins when two files disagree
    #[arg(long, value_enum, default_value = "keep-first")]
    pub conflict_policy: ConflictPolicy,

    /// Number of nearest grid points to blend
    #[arg(long, default_value_t = 4)]
    pub neighbours: usize,

    /// Inverse distance weighting power
    #[arg(long, default_value_t = 2.0)]
    pub power: f64,

    /// Extraction worker threads (defaults to available cores)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Seconds a single file may take to decode before it is reported as failed
    #[arg(long, default_value_t = 120)]
    pub file_timeout_secs: u64,
}

impl CommonArgs {
    pub fn settings(&self, years: Option<(i32, i32)>) -> Result<Settings, ConfigError> {
        Settings {
            target: validate_target(self.latitude, self.longitude)?,
            data_dir: self.data_dir.clone(),
            results_dir: self.results_dir.clone(),
            variables: self.variables.clone(),
            formats: self.formats.clone(),
            missing_marker: self.missing_marker.clone(),
            missing_sentinel: self.missing_sentinel,
            conflict_policy: self.conflict_policy,
            neighbours: self.neighbours,
            power: self.power,
            workers: self.workers,
            file_timeout: Duration::from_secs(self.file_timeout_secs),
            years,
        }
        .validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// First year expected in the coverage audit
    #[arg(long)]
    pub start_year: Option<i32>,

    /// Last year expected in the coverage audit
    #[arg(long)]
    pub end_year: Option<i32>,
}

impl ExtractArgs {
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        self.common
            .settings(validate_years(self.start_year, self.end_year)?)
    }
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, default_value_t = 1940)]
    pub start_year: i32,

    #[arg(long, default_value_t = 2025)]
    pub end_year: i32,

    /// Attempts per month before giving up on it
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Wait after the first failed attempt
    #[arg(long, default_value_t = 60)]
    pub initial_backoff_secs: u64,

    /// Upper bound on the wait between attempts
    #[arg(long, default_value_t = 900)]
    pub max_backoff_secs: u64,

    /// Pause after each completed download
    #[arg(long, default_value_t = 120)]
    pub request_delay_secs: u64,

    /// Degrees added around the target for the request area
    #[arg(long, default_value_t = 0.25)]
    pub buffer: f64,

    /// Requested grid resolution in degrees
    #[arg(long, default_value_t = 0.25)]
    pub grid: f64,

    #[arg(long, default_value = DEFAULT_DATASET)]
    pub dataset: String,

    /// Seconds between job status polls
    #[arg(long, default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Give up on a queued job after this many seconds
    #[arg(long, default_value_t = 3600)]
    pub job_timeout_secs: u64,
}

impl DownloadArgs {
    pub fn settings(&self) -> Result<(Settings, DownloadSettings), ConfigError> {
        let years = validate_years(Some(self.start_year), Some(self.end_year))?;
        let settings = self.common.settings(years)?;

        let download = DownloadSettings {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                initial_delay: Duration::from_secs(self.initial_backoff_secs),
                max_delay: Duration::from_secs(self.max_backoff_secs),
                ..RetryPolicy::default()
            },
            request_delay: Duration::from_secs(self.request_delay_secs),
            buffer: self.buffer,
            grid: self.grid,
            dataset: self.dataset.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
        }
        .validate()?;

        Ok((settings, download))
    }
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    let bar = ProgressBar::new(size).with_message(message);
    if let Ok(style) = ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}") {
        bar.set_style(style.progress_chars("##-"));
    }

    bar
}

// -- Tests -------------------------------------------------------------------
