//! Error types shared across the extraction and download pipeline.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// A grid file could not be turned into messages.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed grid file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Unsupported grid file {path}: GRIB edition {edition} is not supported, only GRIB2")]
    UnsupportedEdition { path: PathBuf, edition: u8 },
}

impl DecodeError {
    pub fn malformed(path: &std::path::Path, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Interpolation could not be attempted for a message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("Grid has no points")]
    EmptyGrid,

    #[error("Grid shape mismatch: {coordinates} coordinates vs {values} values")]
    ShapeMismatch { coordinates: usize, values: usize },
}

/// The variable table is inconsistent. Always fatal.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Variable table is empty")]
    Empty,

    #[error("Duplicate logical name `{0}`")]
    DuplicateLogicalName(String),

    #[error("Numeric id {id} is registered for both `{first}` and `{second}`")]
    DuplicateNumericId {
        id: u32,
        first: String,
        second: String,
    },

    #[error("Expected name `{name}` is registered for both `{first}` and `{second}`")]
    DuplicateExpectedName {
        name: String,
        first: String,
        second: String,
    },

    #[error("Failed to load variable table from {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// The archive request transport failed.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Archive returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Archive rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("Archive job {job} ended as `{status}`")]
    JobFailed { job: String, status: String },

    #[error("Archive job {job} did not finish within {}s", .waited.as_secs())]
    Timeout { job: String, waited: Duration },

    #[error("Unexpected archive response: {0}")]
    Protocol(String),

    #[error("Failed to write download: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Fatal errors abort the remaining download queue instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }
}

/// Invalid user supplied settings.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("Start year {start} is after end year {end}")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("Only one of --start-year and --end-year was given")]
    IncompleteYearRange,

    #[error("Neighbourhood size must be at least 1")]
    NoNeighbours,

    #[error("Weighting power must be positive, got {0}")]
    InvalidPower(f64),

    #[error("Per-file processing timeout must be at least one second")]
    NoFileTimeout,

    #[error("At least one download attempt is required")]
    NoAttempts,

    #[error("Archive credentials not found: {0}")]
    MissingCredentials(String),
}
