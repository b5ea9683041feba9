//! Month-by-month archive download with bounded retries and geometric backoff.

use std::{
    collections::BTreeSet,
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use indicatif::ProgressBar;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tracing::{error, info, instrument, warn};

use crate::{error::TransportError, interpolate::GeoPoint, period::Period};

pub const DEFAULT_DATASET: &str = "reanalysis-era5-single-levels";

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_delay: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `failure`-th failed attempt (1-based).
    pub fn delay_for(&self, failure: u32) -> Duration {
        let exponent = failure.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Bounding box as `[north, west, south, east]` degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Area {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl Area {
    pub fn around(target: GeoPoint, buffer: f64) -> Self {
        Area {
            north: target.lat + buffer,
            west: target.lon - buffer,
            south: target.lat - buffer,
            east: target.lon + buffer,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRequest {
    pub dataset: String,
    pub variable_ids: Vec<u32>,
    pub period: Period,
    pub area: Area,
    pub grid: (f64, f64),
}

impl ArchiveRequest {
    pub fn days(&self) -> Vec<String> {
        (1..=self.period.days()).map(|d| format!("{:02}", d)).collect()
    }

    pub fn hours(&self) -> Vec<String> {
        (0..24).map(|h| format!("{:02}:00", h)).collect()
    }

    /// Request body inputs for the retrieve API.
    pub fn to_inputs(&self) -> Value {
        let params: Vec<String> = self.variable_ids.iter().map(|id| id.to_string()).collect();

        json!({
            "product_type": ["reanalysis"],
            "data_format": "grib",
            "format": "grib",
            "param": params,
            "year": [self.period.year.to_string()],
            "month": [format!("{:02}", self.period.month)],
            "day": self.days(),
            "time": self.hours(),
            "area": [self.area.north, self.area.west, self.area.south, self.area.east],
            "grid": [self.grid.0, self.grid.1],
        })
    }
}

/// Fields shared by every monthly request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pub dataset: String,
    pub variable_ids: Vec<u32>,
    pub area: Area,
    pub grid: (f64, f64),
}

impl RequestTemplate {
    pub fn for_period(&self, period: Period) -> ArchiveRequest {
        ArchiveRequest {
            dataset: self.dataset.clone(),
            variable_ids: self.variable_ids.clone(),
            period,
            area: self.area,
            grid: self.grid,
        }
    }
}

/// Remote archive transport.
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    async fn fetch(&self, request: &ArchiveRequest) -> Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Requested,
    Succeeded,
    FailedRetrying,
    FailedTerminal,
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ChunkState::Pending => "pending",
            ChunkState::Requested => "requested",
            ChunkState::Succeeded => "succeeded",
            ChunkState::FailedRetrying => "failed, retrying",
            ChunkState::FailedTerminal => "failed",
        };
        write!(f, "{}", state)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub period: Period,
    pub state: ChunkState,
    pub attempts: u32,
    pub path: PathBuf,
    pub last_error: Option<String>,
    /// False when the file was already on disk.
    pub downloaded: bool,
}

impl ChunkRecord {
    fn pending(period: Period, path: PathBuf) -> Self {
        ChunkRecord {
            period,
            state: ChunkState::Pending,
            attempts: 0,
            path,
            last_error: None,
            downloaded: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub chunks: Vec<ChunkRecord>,
    /// Set when a fatal transport error stopped the queue.
    pub aborted: bool,
}

impl DownloadReport {
    /// Months whose file reached the data directory.
    pub fn supplied(&self) -> BTreeSet<Period> {
        self.in_state(ChunkState::Succeeded)
            .map(|chunk| chunk.period)
            .collect()
    }

    pub fn in_state(&self, state: ChunkState) -> impl Iterator<Item = &ChunkRecord> {
        self.chunks.iter().filter(move |chunk| chunk.state == state)
    }
}

enum Outcome {
    Fetched,
    Exhausted,
    Fatal,
}

pub struct ChunkedDownloader {
    client: Arc<dyn ArchiveClient>,
    policy: RetryPolicy,
    template: RequestTemplate,
    data_dir: PathBuf,
    request_delay: Duration,
}

impl ChunkedDownloader {
    pub fn new(
        client: Arc<dyn ArchiveClient>,
        policy: RetryPolicy,
        template: RequestTemplate,
        data_dir: &Path,
        request_delay: Duration,
    ) -> Self {
        ChunkedDownloader {
            client,
            policy,
            template,
            data_dir: data_dir.to_path_buf(),
            request_delay,
        }
    }

    /// Downloads each month in order, calling `on_ready` as soon as its file is on disk.
    pub async fn run<F>(&self, periods: &[Period], progress_bar: &ProgressBar, mut on_ready: F) -> DownloadReport
    where
        F: FnMut(Period, PathBuf),
    {
        let mut report = DownloadReport {
            chunks: periods
                .iter()
                .map(|&period| ChunkRecord::pending(period, self.data_dir.join(period.file_name())))
                .collect(),
            aborted: false,
        };
        let total = report.chunks.len();

        for index in 0..total {
            let chunk = &mut report.chunks[index];
            progress_bar.set_message(format!("Downloading {}", chunk.period));

            if chunk.path.exists() {
                info!(period = %chunk.period, path = %chunk.path.display(), "File exists, skipping download");
                chunk.state = ChunkState::Succeeded;
                on_ready(chunk.period, chunk.path.clone());
                progress_bar.inc(1);
                continue;
            }

            let outcome = self.fetch_chunk(chunk).await;
            progress_bar.inc(1);

            match outcome {
                Outcome::Fetched => {
                    on_ready(chunk.period, chunk.path.clone());
                    if index + 1 < total && !self.request_delay.is_zero() {
                        tokio::time::sleep(self.request_delay).await;
                    }
                }
                Outcome::Exhausted => {}
                Outcome::Fatal => {
                    error!(
                        period = %chunk.period,
                        remaining = total - index - 1,
                        "Aborting remaining downloads"
                    );
                    report.aborted = true;
                    break;
                }
            }
        }

        report
    }

    #[instrument(skip(self, chunk), fields(period = %chunk.period))]
    async fn fetch_chunk(&self, chunk: &mut ChunkRecord) -> Outcome {
        let request = self.template.for_period(chunk.period);

        loop {
            chunk.state = ChunkState::Requested;
            chunk.attempts += 1;
            info!(attempt = chunk.attempts, "Requesting month");

            let result = match self.client.fetch(&request).await {
                Ok(bytes) => persist(&chunk.path, &bytes),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    info!(attempt = chunk.attempts, path = %chunk.path.display(), "Downloaded month");
                    chunk.state = ChunkState::Succeeded;
                    chunk.downloaded = true;
                    return Outcome::Fetched;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Archive refused the request");
                    chunk.state = ChunkState::FailedTerminal;
                    chunk.last_error = Some(e.to_string());
                    return Outcome::Fatal;
                }
                Err(e) => {
                    chunk.last_error = Some(e.to_string());

                    if chunk.attempts >= self.policy.max_attempts {
                        error!(attempts = chunk.attempts, error = %e, "All attempts failed, skipping month");
                        chunk.state = ChunkState::FailedTerminal;
                        return Outcome::Exhausted;
                    }

                    chunk.state = ChunkState::FailedRetrying;
                    let delay = self.policy.delay_for(chunk.attempts);
                    warn!(
                        attempt = chunk.attempts,
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "Download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Writes beside the destination, then renames into place.
fn persist(path: &Path, bytes: &[u8]) -> Result<(), TransportError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------
