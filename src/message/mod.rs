//! Decoded grid messages and their classification into logical variables.

pub mod classify;
pub mod grib2;

use std::path::Path;

use chrono::NaiveDateTime;

use crate::{error::DecodeError, interpolate::GeoPoint};

pub use classify::classify;
pub use grib2::Grib2Decoder;

/// One 2-D field for one variable at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMessage {
    /// Short name as identified by the decoder, empty when unknown.
    pub name: String,
    pub numeric_id: Option<u32>,
    pub timestamp: NaiveDateTime,
    pub coordinates: Vec<GeoPoint>,
    pub values: Vec<f64>,
}

/// Turns a grid file into its messages.
pub trait Decoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Vec<GridMessage>, DecodeError>;
}
