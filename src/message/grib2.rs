//! GRIB2 adapter over the `grib` crate.

use std::{fs::File, io::BufReader, path::Path};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use grib::{
    codetables::grib2::Table4_4, Code, ForecastTime, Grib2SubmessageDecoder, GribError, ParseError,
    UtcDateTime,
};
use tracing::debug;

use crate::{error::DecodeError, interpolate::GeoPoint};

use super::{Decoder, GridMessage};

/// ECMWF local parameter tables are carried in discipline 192.
const ECMWF_LOCAL_DISCIPLINE: u8 = 192;

/// WMO oceanographic parameters with an ECMWF counterpart.
const WMO_WAVE_PARAMETERS: [(u8, u8, &str, u32); 3] = [
    (0, 3, "swh", 140229),
    (0, 14, "mwd", 140230),
    (0, 34, "pp1d", 140231),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct Grib2Decoder;

impl Decoder for Grib2Decoder {
    fn decode(&self, path: &Path) -> Result<Vec<GridMessage>, DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let grib2 = grib::from_reader(BufReader::new(file)).map_err(|e| match e {
            GribError::ParseError(ParseError::GRIBVersionMismatch(edition)) => {
                DecodeError::UnsupportedEdition {
                    path: path.to_path_buf(),
                    edition,
                }
            }
            e => DecodeError::malformed(path, e.to_string()),
        })?;

        let mut messages = Vec::new();

        for ((message, submessage_index), submessage) in grib2.iter() {
            let location = format!("message {}.{}", message, submessage_index);

            let discipline = submessage.indicator().discipline;
            let prod_def = submessage.prod_def();
            let (name, numeric_id) = match (prod_def.parameter_category(), prod_def.parameter_number()) {
                (Some(category), Some(number)) => identify(discipline, category, number),
                _ => (String::new(), None),
            };

            let timestamp = valid_time(
                submessage.identification().ref_time_unchecked(),
                prod_def.forecast_time(),
            )
            .ok_or_else(|| DecodeError::malformed(path, format!("{} has no valid time", location)))?;

            let coordinates: Vec<GeoPoint> = submessage
                .latlons()
                .map_err(|e| DecodeError::malformed(path, format!("{}: {}", location, e)))?
                .map(|(lat, lon)| GeoPoint::new(lat as f64, lon as f64))
                .collect();

            let decoder = Grib2SubmessageDecoder::from(submessage)
                .map_err(|e| DecodeError::malformed(path, format!("{}: {}", location, e)))?;
            let values: Vec<f64> = decoder
                .dispatch()
                .map_err(|e| DecodeError::malformed(path, format!("{}: {}", location, e)))?
                .map(f64::from)
                .collect();

            debug!(
                path = %path.display(),
                message = %location,
                name = %name,
                numeric_id = ?numeric_id,
                %timestamp,
                points = values.len(),
                "Decoded message"
            );

            messages.push(GridMessage {
                name,
                numeric_id,
                timestamp,
                coordinates,
                values,
            });
        }

        if messages.is_empty() {
            return Err(DecodeError::malformed(path, "no GRIB2 messages found"));
        }

        Ok(messages)
    }
}

/// Short name and ECMWF parameter id for a product's discipline/category/number.
pub fn identify(discipline: u8, category: u8, number: u8) -> (String, Option<u32>) {
    match discipline {
        ECMWF_LOCAL_DISCIPLINE => (String::new(), Some(category as u32 * 1000 + number as u32)),
        10 => WMO_WAVE_PARAMETERS
            .iter()
            .find(|(c, n, _, _)| *c == category && *n == number)
            .map(|(_, _, name, id)| (name.to_string(), Some(*id)))
            .unwrap_or_default(),
        _ => (String::new(), None),
    }
}

/// Reference time plus forecast offset.
pub fn valid_time(reference: UtcDateTime, forecast: Option<ForecastTime>) -> Option<NaiveDateTime> {
    let reference = NaiveDate::from_ymd_opt(
        reference.year as i32,
        reference.month as u32,
        reference.day as u32,
    )?
    .and_hms_opt(
        reference.hour as u32,
        reference.minute as u32,
        reference.second as u32,
    )?;

    let Some(forecast) = forecast else {
        return Some(reference);
    };

    let value = forecast.value as i64;
    let offset = match forecast.unit {
        Code::Name(Table4_4::Second) => Duration::seconds(value),
        Code::Name(Table4_4::Minute) => Duration::minutes(value),
        Code::Name(Table4_4::Hour) => Duration::hours(value),
        Code::Name(Table4_4::ThreeHours) => Duration::hours(3 * value),
        Code::Name(Table4_4::SixHours) => Duration::hours(6 * value),
        Code::Name(Table4_4::TwelveHours) => Duration::hours(12 * value),
        Code::Name(Table4_4::Day) => Duration::days(value),
        _ => return None,
    };

    reference.checked_add_signed(offset)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{io::Write, path::PathBuf};

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn should_identify_ecmwf_local_parameters() {
        assert_eq!(identify(192, 140, 229), (String::new(), Some(140229)));
        assert_eq!(identify(192, 140, 245), (String::new(), Some(140245)));
    }

    #[test]
    fn should_identify_wmo_wave_parameters() {
        assert_eq!(identify(10, 0, 3), ("swh".to_string(), Some(140229)));
        assert_eq!(identify(10, 0, 14), ("mwd".to_string(), Some(140230)));
        assert_eq!(identify(10, 0, 34), ("pp1d".to_string(), Some(140231)));
    }

    #[test]
    fn should_leave_other_parameters_unnamed() {
        assert_eq!(identify(0, 0, 0), (String::new(), None));
        assert_eq!(identify(10, 0, 99), (String::new(), None));
    }

    #[test]
    fn should_add_forecast_offset() {
        let reference = UtcDateTime::new(1940, 1, 31, 18, 0, 0);
        let forecast = ForecastTime::new(Code::Name(Table4_4::Hour), 7);

        let valid = valid_time(reference, Some(forecast)).unwrap();

        assert_eq!(valid.to_string(), "1940-02-01 01:00:00");
    }

    #[test]
    fn should_use_reference_time_without_forecast() {
        let reference = UtcDateTime::new(2001, 6, 15, 12, 0, 0);

        let valid = valid_time(reference, None).unwrap();

        assert_eq!(valid.to_string(), "2001-06-15 12:00:00");
    }

    #[test]
    fn should_scale_multi_hour_units() {
        let reference = UtcDateTime::new(2001, 6, 15, 0, 0, 0);
        let forecast = ForecastTime::new(Code::Name(Table4_4::SixHours), 2);

        let valid = valid_time(reference, Some(forecast)).unwrap();

        assert_eq!(valid.to_string(), "2001-06-15 12:00:00");
    }

    #[test]
    fn should_reject_unsupported_forecast_unit() {
        let reference = UtcDateTime::new(2001, 6, 15, 0, 0, 0);
        let forecast = ForecastTime::new(Code::Name(Table4_4::Month), 1);

        assert_eq!(valid_time(reference, Some(forecast)), None);
    }

    #[test]
    fn should_decode_simple_packed_message() {
        let messages = Grib2Decoder.decode(&fixture_path("swh_2x2.grib2")).unwrap();

        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.name, "swh");
        assert_eq!(message.numeric_id, Some(140229));
        assert_eq!(message.timestamp.to_string(), "1940-01-01 06:00:00");
        assert_eq!(
            message.coordinates,
            vec![
                GeoPoint::new(41.25, -9.75),
                GeoPoint::new(41.25, -9.5),
                GeoPoint::new(41.0, -9.75),
                GeoPoint::new(41.0, -9.5),
            ]
        );
        assert_eq!(message.values.len(), 4);
        assert_eq!(message.values[0], 1.5);
        assert!(message.values[1].is_nan());
        assert_eq!(message.values[2], 2.5);
        assert_eq!(message.values[3], 3.5);
    }

    #[test]
    fn should_report_grib1_file_as_unsupported_edition() {
        let mut file = NamedTempFile::new().unwrap();
        let mut bytes = b"GRIB\x00\x00\x20\x01".to_vec();
        bytes.resize(32, 0);
        file.write_all(&bytes).unwrap();

        let result = Grib2Decoder.decode(file.path());

        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedEdition { edition: 1, .. })
        ));
    }

    #[test]
    fn should_report_missing_file_as_io_error() {
        let result = Grib2Decoder.decode(Path::new("/nonexistent/ERA5_1940_01.grib"));

        assert!(matches!(result, Err(DecodeError::Io { .. })));
    }

    #[test]
    fn should_report_non_grib_file_as_malformed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not a grid file").unwrap();

        let result = Grib2Decoder.decode(file.path());

        assert!(matches!(result, Err(DecodeError::Malformed { .. })));
    }

    fn fixture_path(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("src/message/testdata")
            .join(name)
    }
}
