//! Calendar months, the unit of download work and coverage auditing.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Period { year, month })
    }

    pub fn from_timestamp(timestamp: &NaiveDateTime) -> Self {
        Period {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }

    /// Every month from January of `start_year` to December of `end_year`.
    pub fn range(start_year: i32, end_year: i32) -> Vec<Period> {
        (start_year..=end_year)
            .flat_map(|year| (1..=12).map(move |month| Period { year, month }))
            .collect()
    }

    pub fn days(&self) -> u32 {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1);
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };

        match (first, next) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            _ => 0,
        }
    }

    pub fn file_name(&self) -> String {
        format!("ERA5_{}_{:02}.grib", self.year, self.month)
    }

    /// Parses names of the form `ERA5_<YYYY>_<MM>.grib` (or `.grib2`).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name
            .strip_suffix(".grib2")
            .or_else(|| name.strip_suffix(".grib"))?;
        let rest = stem.strip_prefix("ERA5_")?;
        let (year, month) = rest.split_once('_')?;

        if year.len() != 4 || month.len() != 2 {
            return None;
        }

        Period::new(year.parse().ok()?, month.parse().ok()?)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_count_days_in_month() {
        assert_eq!(Period::new(1940, 1).unwrap().days(), 31);
        assert_eq!(Period::new(1940, 2).unwrap().days(), 29);
        assert_eq!(Period::new(1941, 2).unwrap().days(), 28);
        assert_eq!(Period::new(2024, 12).unwrap().days(), 31);
    }

    #[test]
    fn should_enumerate_year_range() {
        let periods = Period::range(1940, 1941);

        assert_eq!(periods.len(), 24);
        assert_eq!(periods[0], Period { year: 1940, month: 1 });
        assert_eq!(periods[23], Period { year: 1941, month: 12 });
        assert!(periods.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn should_round_trip_file_name() {
        let period = Period::new(1987, 3).unwrap();

        assert_eq!(period.file_name(), "ERA5_1987_03.grib");
        assert_eq!(Period::from_file_name("ERA5_1987_03.grib"), Some(period));
        assert_eq!(Period::from_file_name("ERA5_1987_03.grib2"), Some(period));
    }

    #[test]
    fn should_ignore_unconventional_file_names() {
        assert_eq!(Period::from_file_name("waves.grib"), None);
        assert_eq!(Period::from_file_name("ERA5_1987_13.grib"), None);
        assert_eq!(Period::from_file_name("ERA5_87_03.grib"), None);
        assert_eq!(Period::from_file_name("ERA5_1987_03.nc"), None);
    }

    #[test]
    fn should_take_period_from_timestamp() {
        let timestamp = NaiveDate::from_ymd_opt(1999, 7, 31)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();

        assert_eq!(Period::from_timestamp(&timestamp).to_string(), "1999-07");
    }
}
