//! Inverse distance weighted estimate of a field at a single point.

use crate::error::InterpolationError;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Neighbours closer than this are treated as the target itself.
const COINCIDENT_KM: f64 = 1e-6;

/// ECMWF GRIB missing value.
pub const DEFAULT_MISSING_SENTINEL: f64 = 9999.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();

        EARTH_RADIUS_KM * c
    }
}

#[derive(Debug, Clone)]
pub struct IdwInterpolator {
    neighbours: usize,
    power: f64,
    missing_sentinel: f64,
}

impl Default for IdwInterpolator {
    fn default() -> Self {
        IdwInterpolator {
            neighbours: 4,
            power: 2.0,
            missing_sentinel: DEFAULT_MISSING_SENTINEL,
        }
    }
}

impl IdwInterpolator {
    pub fn new(neighbours: usize, power: f64, missing_sentinel: f64) -> Self {
        IdwInterpolator {
            neighbours: neighbours.max(1),
            power,
            missing_sentinel,
        }
    }

    pub fn is_missing(&self, value: f64) -> bool {
        value.is_nan() || value == self.missing_sentinel
    }

    /// Returns `Ok(None)` when every neighbour in range is missing, or when the
    /// grid point at the target itself is missing.
    pub fn interpolate(
        &self,
        target: GeoPoint,
        coordinates: &[GeoPoint],
        values: &[f64],
    ) -> Result<Option<f64>, InterpolationError> {
        if coordinates.len() != values.len() {
            return Err(InterpolationError::ShapeMismatch {
                coordinates: coordinates.len(),
                values: values.len(),
            });
        }
        if coordinates.is_empty() {
            return Err(InterpolationError::EmptyGrid);
        }

        let mut ranked: Vec<(f64, usize)> = coordinates
            .iter()
            .enumerate()
            .map(|(index, point)| (target.distance_km(point), index))
            .collect();

        let k = self.neighbours.min(ranked.len());
        if k < ranked.len() {
            ranked.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
            ranked.truncate(k);
        }
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        if let Some(&(distance, index)) = ranked.first() {
            if distance < COINCIDENT_KM {
                let value = values[index];
                return Ok((!self.is_missing(value)).then_some(value));
            }
        }

        let weighted: Vec<(f64, f64)> = ranked
            .into_iter()
            .map(|(distance, index)| (distance, values[index]))
            .filter(|&(_, value)| !self.is_missing(value))
            .map(|(distance, value)| (1.0 / distance.powf(self.power), value))
            .collect();

        let weight_total: f64 = weighted.iter().map(|(weight, _)| weight).sum();
        if weighted.is_empty() || weight_total <= 0.0 {
            return Ok(None);
        }

        let estimate: f64 = weighted
            .iter()
            .map(|(weight, value)| (weight / weight_total) * value)
            .sum();

        Ok(Some(estimate))
    }
}

// -- Tests -------------------------------------------------------------------
