//! Turns one grid file into point records for the target coordinate.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{NaiveDateTime, Timelike};
use tracing::{debug, warn};

use crate::{
    interpolate::{GeoPoint, IdwInterpolator},
    message::{classify, Decoder},
    registry::VariableRegistry,
};

/// One interpolated value. `value` is `None` when every neighbour was missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPoint {
    pub timestamp: NaiveDateTime,
    pub variable: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    Unresolved,
    Interpolation(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unresolved => write!(f, "unresolved variable"),
            SkipReason::Interpolation(reason) => write!(f, "interpolation failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedMessage {
    pub path: PathBuf,
    pub index: usize,
    pub name: String,
    pub numeric_id: Option<u32>,
    pub reason: SkipReason,
}

/// A file that produced nothing because it could not be processed.
#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileExtraction {
    pub path: PathBuf,
    pub points: Vec<ExtractedPoint>,
    pub skipped: Vec<SkippedMessage>,
    pub failure: Option<FileFailure>,
}

impl FileExtraction {
    pub fn failed(path: &Path, reason: impl Into<String>) -> Self {
        FileExtraction {
            path: path.to_path_buf(),
            points: Vec::new(),
            skipped: Vec::new(),
            failure: Some(FileFailure {
                path: path.to_path_buf(),
                reason: reason.into(),
            }),
        }
    }
}

pub struct GribExtractor {
    registry: Arc<VariableRegistry>,
    interpolator: IdwInterpolator,
    target: GeoPoint,
    decoder: Arc<dyn Decoder>,
}

impl GribExtractor {
    pub fn new(
        registry: Arc<VariableRegistry>,
        interpolator: IdwInterpolator,
        target: GeoPoint,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        GribExtractor {
            registry,
            interpolator,
            target,
            decoder,
        }
    }

    /// Never fails: decode errors become the file's `failure`.
    pub fn extract(&self, path: &Path) -> FileExtraction {
        let messages = match self.decoder.decode(path) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to decode file");
                return FileExtraction::failed(path, e.to_string());
            }
        };

        let mut points = Vec::new();
        let mut skipped = Vec::new();

        for (index, message) in messages.into_iter().enumerate() {
            let Some(variable) = classify(&self.registry, &message).logical_name() else {
                debug!(
                    path = %path.display(),
                    index,
                    name = %message.name,
                    numeric_id = ?message.numeric_id,
                    "Skipping unresolved message"
                );
                skipped.push(SkippedMessage {
                    path: path.to_path_buf(),
                    index,
                    name: message.name,
                    numeric_id: message.numeric_id,
                    reason: SkipReason::Unresolved,
                });
                continue;
            };

            match self
                .interpolator
                .interpolate(self.target, &message.coordinates, &message.values)
            {
                Ok(value) => points.push(ExtractedPoint {
                    timestamp: truncate_to_hour(message.timestamp),
                    variable: variable.to_string(),
                    value,
                }),
                Err(e) => {
                    debug!(path = %path.display(), index, error = %e, "Skipping message");
                    skipped.push(SkippedMessage {
                        path: path.to_path_buf(),
                        index,
                        name: message.name,
                        numeric_id: message.numeric_id,
                        reason: SkipReason::Interpolation(e.to_string()),
                    });
                }
            }
        }

        if points.is_empty() {
            warn!(path = %path.display(), "No data extracted");
        } else {
            debug!(path = %path.display(), points = points.len(), skipped = skipped.len(), "Extracted file");
        }

        FileExtraction {
            path: path.to_path_buf(),
            points,
            skipped,
            failure: None,
        }
    }
}

pub fn truncate_to_hour(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .date()
        .and_hms_opt(timestamp.hour(), 0, 0)
        .unwrap_or(timestamp)
}

// -- Tests -------------------------------------------------------------------
