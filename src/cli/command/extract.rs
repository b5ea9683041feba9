//! Extract-only mode over the grid files already on disk.

use std::{sync::Arc, time::Instant};

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    cli::{create_progress_bar, ExtractArgs},
    message::Grib2Decoder,
    pipeline::{grid_files, supplied_periods, Pipeline},
    table::CoverageAudit,
};

use super::{save_outputs, RunSummary};

pub async fn extract(args: &ExtractArgs) -> Result<String> {
    let started = Instant::now();
    let settings = args.settings()?;

    let files = grid_files(&settings.data_dir)?;
    if files.is_empty() {
        warn!(dir = %settings.data_dir.display(), "No grid files found");
    }
    info!(files = files.len(), dir = %settings.data_dir.display(), "Extracting grid files");

    let audit = settings
        .expected_periods()
        .map(|expected| CoverageAudit::new(expected, supplied_periods(&files)));

    let pipeline = Pipeline::new(settings, Arc::new(Grib2Decoder))?;

    let pb = create_progress_bar(files.len() as u64, "Processing grid files".to_string());
    let batch = pipeline.extract_files(&files, &pb);
    pb.finish_with_message("Grid files processed");

    let assembled = pipeline.assemble(&batch, audit.as_ref());
    let outputs = save_outputs(&assembled, pipeline.settings())?;

    Ok(RunSummary {
        batch: &batch,
        assembled: &assembled,
        outputs: &outputs,
        download: None,
        elapsed: started.elapsed(),
    }
    .to_string())
}
