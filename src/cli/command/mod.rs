pub mod download;
pub mod extract;

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use tracing::info;

pub use download::download;
pub use extract::extract;

use crate::{
    config::Settings,
    deserialise::Batch,
    download::{ChunkState, DownloadReport},
    output::{self, OutputFormat},
    pipeline::Assembled,
};

const SKIPPED_DETAIL_LIMIT: usize = 10;

pub fn make_output_file_name(results_dir: &Path, format: OutputFormat) -> PathBuf {
    let today = Local::now();
    let file_name = format!(
        "era5-point-{}-{:02}-{:02}.{}",
        today.year(),
        today.month(),
        today.day(),
        format.extension()
    );

    results_dir.join(file_name)
}

/// Writes the table in every requested format, replacing same-named files.
pub fn save_outputs(assembled: &Assembled, settings: &Settings) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&settings.results_dir)
        .with_context(|| format!("Failed to create {}", settings.results_dir.display()))?;

    let mut paths = Vec::new();
    for format in settings.output_formats() {
        let path = make_output_file_name(&settings.results_dir, format);
        output::save(&assembled.table, format, &path, &settings.missing_marker)?;
        info!(path = %path.display(), rows = assembled.table.rows.len(), "Saved table");
        paths.push(path);
    }

    Ok(paths)
}

/// End of run report.
pub struct RunSummary<'a> {
    pub batch: &'a Batch,
    pub assembled: &'a Assembled,
    pub outputs: &'a [PathBuf],
    pub download: Option<&'a DownloadReport>,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = &self.assembled.table;

        writeln!(f, "Files processed: {}", self.batch.files_processed)?;
        writeln!(f, "Files failed: {}", self.batch.failures.len())?;
        for failure in &self.batch.failures {
            writeln!(f, "  {}: {}", failure.path.display(), failure.reason)?;
        }
        for path in &self.batch.empty_files {
            writeln!(f, "  {}: no data extracted", path.display())?;
        }

        writeln!(f, "Messages skipped: {}", self.batch.skipped.len())?;
        for (reason, count) in self.batch.skipped_by_reason() {
            writeln!(f, "  {}: {}", reason, count)?;
        }
        for skipped in self.batch.skipped.iter().take(SKIPPED_DETAIL_LIMIT) {
            let id = skipped
                .numeric_id
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            writeln!(
                f,
                "    {} message {} (name `{}`, id {}): {}",
                skipped.path.display(),
                skipped.index,
                skipped.name,
                id,
                skipped.reason
            )?;
        }

        if !self.assembled.conflicts.is_empty() {
            writeln!(f, "Conflicting values: {}", self.assembled.conflicts.len())?;
        }

        if let Some(report) = self.download {
            let count = |state| report.in_state(state).count();
            let downloaded = report.chunks.iter().filter(|chunk| chunk.downloaded).count();
            writeln!(
                f,
                "Months: {} succeeded ({} downloaded), {} failed, {} not attempted{}",
                count(ChunkState::Succeeded),
                downloaded,
                count(ChunkState::FailedTerminal),
                count(ChunkState::Pending),
                if report.aborted { " (aborted)" } else { "" }
            )?;
            for chunk in report.in_state(ChunkState::FailedTerminal) {
                writeln!(
                    f,
                    "  {}: {}",
                    chunk.period,
                    chunk.last_error.as_deref().unwrap_or("unknown error")
                )?;
            }
        }

        writeln!(f, "Coverage gaps: {}", table.gaps.len())?;
        for gap in &table.gaps {
            writeln!(f, "  {}: {}", gap.period, gap.reason)?;
        }

        writeln!(f, "Rows written: {}", table.rows.len())?;
        for path in self.outputs {
            writeln!(f, "File saved to `{}`", path.display())?;
        }

        write!(f, "Total time: {:.1}s", self.elapsed.as_secs_f64())
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::{
        extract::{FileFailure, SkipReason, SkippedMessage},
        period::Period,
        table::{CoverageGap, FinalTable, GapReason},
    };

    use super::*;

    #[test]
    fn should_make_dated_output_file_name() {
        let path = make_output_file_name(Path::new("results"), OutputFormat::Parquet);

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("era5-point-"));
        assert!(name.ends_with(".parquet"));
        assert_eq!(name.len(), "era5-point-2024-01-01.parquet".len());
        assert_eq!(path.parent(), Some(Path::new("results")));
    }

    #[test]
    fn should_summarise_failures_skips_and_gaps() {
        let batch = Batch {
            files_processed: 3,
            failures: vec![FileFailure {
                path: PathBuf::from("grib/ERA5_1940_02.grib"),
                reason: "truncated".to_string(),
            }],
            skipped: vec![SkippedMessage {
                path: PathBuf::from("grib/ERA5_1940_01.grib"),
                index: 4,
                name: "2t".to_string(),
                numeric_id: None,
                reason: SkipReason::Unresolved,
            }],
            ..Batch::default()
        };
        let assembled = Assembled {
            table: FinalTable {
                columns: vec!["swh".to_string()],
                rows: vec![],
                gaps: vec![CoverageGap {
                    period: Period::new(1940, 2).unwrap(),
                    reason: GapReason::MissingFile,
                }],
            },
            conflicts: vec![],
        };
        let outputs = vec![PathBuf::from("results/era5-point-2024-01-01.csv")];

        let text = RunSummary {
            batch: &batch,
            assembled: &assembled,
            outputs: &outputs,
            download: None,
            elapsed: Duration::from_millis(1500),
        }
        .to_string();

        assert!(text.contains("Files processed: 3"));
        assert!(text.contains("grib/ERA5_1940_02.grib: truncated"));
        assert!(text.contains("unresolved variable: 1"));
        assert!(text.contains("grib/ERA5_1940_01.grib message 4 (name `2t`, id -): unresolved variable"));
        assert!(text.contains("1940-02: missing file"));
        assert!(text.contains("File saved to `results/era5-point-2024-01-01.csv`"));
        assert!(text.ends_with("Total time: 1.5s"));
    }
}
