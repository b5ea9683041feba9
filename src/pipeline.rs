//! Wires extraction, download and assembly together for both modes.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    config::Settings,
    deserialise::{Batch, ExtractionPool},
    download::{ChunkedDownloader, DownloadReport},
    extract::GribExtractor,
    message::Decoder,
    period::Period,
    registry::VariableRegistry,
    table::{Conflict, CoverageAudit, FinalTable, ResultTable},
};

pub struct Pipeline {
    registry: Arc<VariableRegistry>,
    pool: ExtractionPool,
    settings: Settings,
}

/// The assembled table and what went into it.
#[derive(Debug)]
pub struct Assembled {
    pub table: FinalTable,
    pub conflicts: Vec<Conflict>,
}

impl Pipeline {
    pub fn new(settings: Settings, decoder: Arc<dyn Decoder>) -> Result<Self> {
        let registry = settings.registry()?;
        let extractor = GribExtractor::new(
            Arc::clone(&registry),
            settings.interpolator(),
            settings.target,
            decoder,
        );
        let pool = ExtractionPool::new(Arc::new(extractor), settings.workers, settings.file_timeout)?;

        for spec in registry.specs() {
            debug!(
                variable = %spec.logical_name,
                id = spec.numeric_id,
                name = %spec.expected_name,
                "{}",
                spec.description
            );
        }
        info!(
            variables = registry.specs().len(),
            lat = settings.target.lat,
            lon = settings.target.lon,
            "Extraction pipeline ready"
        );

        Ok(Pipeline {
            registry,
            pool,
            settings,
        })
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn extract_files(&self, files: &[PathBuf], progress_bar: &ProgressBar) -> Batch {
        self.pool.deserialise(files, progress_bar)
    }

    /// Downloads month by month, extracting each file as soon as it lands.
    ///
    /// `extract_bar` grows by one per submitted file and ticks as results come
    /// back, while downloads are still running.
    pub async fn download_and_extract(
        &self,
        downloader: &ChunkedDownloader,
        periods: &[Period],
        download_bar: &ProgressBar,
        extract_bar: &ProgressBar,
    ) -> (DownloadReport, Batch) {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let downloads = async {
            let report = downloader
                .run(periods, download_bar, |_, path| {
                    extract_bar.inc_length(1);
                    self.pool.submit(path, tx.clone());
                })
                .await;
            drop(tx);
            report
        };

        let extractions = async {
            let mut batch = Batch::default();
            while let Some(extraction) = rx.recv().await {
                extract_bar.inc(1);
                batch.absorb(extraction);
            }
            batch
        };

        tokio::join!(downloads, extractions)
    }

    /// Merges every point and finalizes once.
    pub fn assemble(&self, batch: &Batch, audit: Option<&CoverageAudit>) -> Assembled {
        let mut table = ResultTable::new(self.settings.conflict_policy);
        table.merge(&batch.points);

        let conflicts = table.conflicts().to_vec();
        let table = table.finalize(&self.registry, audit);

        info!(rows = table.rows.len(), gaps = table.gaps.len(), "Assembled table");

        Assembled { table, conflicts }
    }
}

/// Grid files in `dir`, sorted by name.
pub fn grid_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in dir
        .read_dir()
        .with_context(|| format!("Failed to read data directory {}", dir.display()))?
    {
        let path = entry?.path();
        let is_grid = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "grib" || ext == "grib2");
        if path.is_file() && is_grid {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Months attributable to files by their `ERA5_<YYYY>_<MM>` names.
pub fn supplied_periods(files: &[PathBuf]) -> BTreeSet<Period> {
    files
        .iter()
        .filter_map(|path| path.file_name()?.to_str())
        .filter_map(Period::from_file_name)
        .collect()
}

// -- Tests -------------------------------------------------------------------
