//! CSV output with an explicit missing marker.

use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result};
use arrow::csv::WriterBuilder;

use crate::table::FinalTable;

use super::to_record_batch;

pub fn save_csv(table: &FinalTable, file_path: &Path, missing_marker: &str) -> Result<()> {
    let batch = to_record_batch(table)?;

    let file = File::create(file_path)
        .with_context(|| format!("Failed to create {}", file_path.display()))?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .with_null(missing_marker.to_string())
        .build(BufWriter::new(file));

    writer.write(&batch)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::output::tests::table_fixture;

    use super::*;

    #[test]
    fn should_write_header_rows_and_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        save_csv(&table_fixture(), &path, "NaN").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "datetime,swh,mwd");
        assert_eq!(lines[1], "1940-01-01 00:00:00,1.5,NaN");
        assert_eq!(lines[2], "1940-01-01 01:00:00,1.75,270.5");
    }

    #[test]
    fn should_use_custom_missing_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        save_csv(&table_fixture(), &path, "").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("1940-01-01 00:00:00,1.5,\n"));
    }
}
