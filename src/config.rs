//! Validated run settings.

use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    download::{Area, RequestTemplate, RetryPolicy},
    error::{ConfigError, RegistryError},
    interpolate::{GeoPoint, IdwInterpolator},
    output::OutputFormat,
    period::Period,
    registry::VariableRegistry,
    table::ConflictPolicy,
};

/// Settings shared by both modes.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target: GeoPoint,
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub variables: Option<PathBuf>,
    pub formats: Vec<OutputFormat>,
    pub missing_marker: String,
    pub missing_sentinel: f64,
    pub conflict_policy: ConflictPolicy,
    pub neighbours: usize,
    pub power: f64,
    pub workers: Option<usize>,
    /// A file still being decoded after this long is reported as failed.
    pub file_timeout: Duration,
    /// Inclusive year range to audit coverage against.
    pub years: Option<(i32, i32)>,
}

impl Settings {
    pub fn validate(self) -> Result<Self, ConfigError> {
        validate_target(self.target.lat, self.target.lon)?;
        if let Some((start, end)) = self.years {
            validate_years(Some(start), Some(end))?;
        }
        if self.neighbours == 0 {
            return Err(ConfigError::NoNeighbours);
        }
        if !(self.power.is_finite() && self.power > 0.0) {
            return Err(ConfigError::InvalidPower(self.power));
        }
        if self.file_timeout.is_zero() {
            return Err(ConfigError::NoFileTimeout);
        }
        Ok(self)
    }

    pub fn registry(&self) -> Result<Arc<VariableRegistry>, RegistryError> {
        let registry = match &self.variables {
            Some(path) => VariableRegistry::from_yaml_file(path)?,
            None => VariableRegistry::era5_waves()?,
        };
        Ok(Arc::new(registry))
    }

    pub fn interpolator(&self) -> IdwInterpolator {
        IdwInterpolator::new(self.neighbours, self.power, self.missing_sentinel)
    }

    pub fn expected_periods(&self) -> Option<Vec<Period>> {
        self.years.map(|(start, end)| Period::range(start, end))
    }

    /// Output formats without repeats, csv first.
    pub fn output_formats(&self) -> Vec<OutputFormat> {
        let mut formats = self.formats.clone();
        formats.sort();
        formats.dedup();
        if formats.is_empty() {
            formats.push(OutputFormat::Csv);
        }
        formats
    }
}

/// Settings used only when downloading.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub retry: RetryPolicy,
    pub request_delay: Duration,
    pub buffer: f64,
    pub grid: f64,
    pub dataset: String,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
}

impl DownloadSettings {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        Ok(self)
    }

    pub fn request_template(&self, target: GeoPoint, registry: &VariableRegistry) -> RequestTemplate {
        RequestTemplate {
            dataset: self.dataset.clone(),
            variable_ids: registry.numeric_ids(),
            area: Area::around(target, self.buffer),
            grid: (self.grid, self.grid),
        }
    }
}

pub fn validate_target(lat: f64, lon: f64) -> Result<GeoPoint, ConfigError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ConfigError::LatitudeOutOfRange(lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(ConfigError::LongitudeOutOfRange(lon));
    }
    Ok(GeoPoint::new(lat, lon))
}

pub fn validate_years(start: Option<i32>, end: Option<i32>) -> Result<Option<(i32, i32)>, ConfigError> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) if start > end => Err(ConfigError::InvalidYearRange { start, end }),
        (Some(start), Some(end)) => Ok(Some((start, end))),
        _ => Err(ConfigError::IncompleteYearRange),
    }
}

// -- Tests -------------------------------------------------------------------
