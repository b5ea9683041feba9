//! Fans the extractor out over a worker pool and aggregates per-file results.

use std::{
    collections::BTreeMap,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{mpsc as std_mpsc, Arc},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::extract::{ExtractedPoint, FileExtraction, FileFailure, GribExtractor, SkipReason, SkippedMessage};

/// Aggregate of many file extractions.
#[derive(Debug, Default)]
pub struct Batch {
    pub points: Vec<ExtractedPoint>,
    pub files_processed: usize,
    pub failures: Vec<FileFailure>,
    pub skipped: Vec<SkippedMessage>,
    /// Files that decoded but produced no points.
    pub empty_files: Vec<PathBuf>,
}

impl Batch {
    pub fn absorb(&mut self, extraction: FileExtraction) {
        self.files_processed += 1;

        match extraction.failure {
            Some(failure) => self.failures.push(failure),
            None if extraction.points.is_empty() => self.empty_files.push(extraction.path),
            None => {}
        }

        self.points.extend(extraction.points);
        self.skipped.extend(extraction.skipped);
    }

    /// Skipped message counts grouped by reason.
    pub fn skipped_by_reason(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for skipped in &self.skipped {
            *counts.entry(skipped.reason.clone()).or_insert(0) += 1;
        }
        counts
    }
}

pub struct ExtractionPool {
    pool: rayon::ThreadPool,
    extractor: Arc<GribExtractor>,
    file_timeout: Duration,
}

impl ExtractionPool {
    /// Sized to the available parallelism unless `workers` is given.
    pub fn new(extractor: Arc<GribExtractor>, workers: Option<usize>, file_timeout: Duration) -> Result<Self> {
        let workers = workers
            .filter(|&n| n > 0)
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("extract-{}", i))
            .build()
            .context("Failed to start extraction worker pool")?;

        debug!(workers, timeout_secs = file_timeout.as_secs(), "Started extraction pool");

        Ok(ExtractionPool {
            pool,
            extractor,
            file_timeout,
        })
    }

    /// Extracts every file, ticking `progress_bar` once per file.
    pub fn deserialise(&self, files: &[PathBuf], progress_bar: &ProgressBar) -> Batch {
        let extractions: Vec<FileExtraction> = self.pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    let extraction = extract_with_deadline(&self.extractor, path, self.file_timeout);
                    progress_bar.inc(1);
                    extraction
                })
                .collect()
        });

        let mut batch = Batch::default();
        for extraction in extractions {
            batch.absorb(extraction);
        }
        batch
    }

    /// Queues one file; its result is sent on `results` when done.
    pub fn submit(&self, path: PathBuf, results: UnboundedSender<FileExtraction>) {
        let extractor = Arc::clone(&self.extractor);
        let file_timeout = self.file_timeout;
        self.pool.spawn(move || {
            let extraction = extract_with_deadline(&extractor, &path, file_timeout);
            if results.send(extraction).is_err() {
                warn!(path = %path.display(), "Extraction result dropped, receiver closed");
            }
        });
    }
}

/// Runs the extraction on its own thread and gives up waiting after `timeout`.
///
/// A decode that never returns cannot be cancelled, so its thread is left
/// detached and the file is reported as failed. The pool worker moves on.
fn extract_with_deadline(extractor: &Arc<GribExtractor>, path: &Path, timeout: Duration) -> FileExtraction {
    let (tx, rx) = std_mpsc::sync_channel(1);
    let worker = {
        let extractor = Arc::clone(extractor);
        let path = path.to_path_buf();
        thread::Builder::new()
            .name("extract-file".to_string())
            .spawn(move || {
                // the receiver is gone once the deadline passed
                let _ = tx.send(extract_isolated(&extractor, &path));
            })
    };

    if let Err(e) = worker {
        warn!(path = %path.display(), error = %e, "Failed to start extraction thread");
        return FileExtraction::failed(path, format!("could not start extraction thread: {}", e));
    }

    match rx.recv_timeout(timeout) {
        Ok(extraction) => extraction,
        Err(std_mpsc::RecvTimeoutError::Timeout) => {
            warn!(path = %path.display(), timeout_secs = timeout.as_secs_f64(), "Extraction timed out");
            FileExtraction::failed(path, format!("timed out after {:?}", timeout))
        }
        Err(std_mpsc::RecvTimeoutError::Disconnected) => {
            FileExtraction::failed(path, "extraction thread exited without a result".to_string())
        }
    }
}

/// A panicking worker becomes a failure for its file only.
fn extract_isolated(extractor: &GribExtractor, path: &Path) -> FileExtraction {
    match panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(path))) {
        Ok(extraction) => extraction,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(path = %path.display(), %reason, "Extraction worker panicked");
            FileExtraction::failed(path, format!("worker panicked: {}", reason))
        }
    }
}

// -- Tests -------------------------------------------------------------------
