//! Download & process mode: fetch each month, extracting files as they arrive.

use std::{sync::Arc, time::Instant};

use anyhow::Result;
use indicatif::MultiProgress;
use tracing::info;

use crate::{
    cds::{CdsClient, Credentials},
    cli::{create_progress_bar, create_spinner, DownloadArgs},
    download::ChunkedDownloader,
    message::Grib2Decoder,
    pipeline::Pipeline,
    table::CoverageAudit,
};

use super::{save_outputs, RunSummary};

pub async fn download(args: &DownloadArgs) -> Result<String> {
    let started = Instant::now();
    let (settings, download) = args.settings()?;
    let periods = settings.expected_periods().unwrap_or_default();

    let client = CdsClient::new(Credentials::load()?, download.poll_interval, download.job_timeout)?;
    let pipeline = Pipeline::new(settings, Arc::new(Grib2Decoder))?;
    let downloader = ChunkedDownloader::new(
        Arc::new(client),
        download.retry.clone(),
        download.request_template(pipeline.settings().target, pipeline.registry()),
        &pipeline.settings().data_dir,
        download.request_delay,
    );

    info!(
        months = periods.len(),
        dataset = %download.dataset,
        dir = %pipeline.settings().data_dir.display(),
        "Downloading and processing"
    );

    let bars = MultiProgress::new();
    let download_bar = bars.add(create_progress_bar(periods.len() as u64, "Downloading months".to_string()));
    let extract_bar = bars.add(create_progress_bar(0, "Extracting files".to_string()));
    let (report, batch) = pipeline
        .download_and_extract(&downloader, &periods, &download_bar, &extract_bar)
        .await;
    download_bar.finish_with_message("Downloads finished");
    extract_bar.finish_with_message("Extraction finished");

    let spinner = create_spinner("Assembling table...".to_string());
    let audit = CoverageAudit::new(periods, report.supplied());
    let assembled = pipeline.assemble(&batch, Some(&audit));
    let outputs = save_outputs(&assembled, pipeline.settings())?;
    spinner.finish_with_message("Table assembled");

    Ok(RunSummary {
        batch: &batch,
        assembled: &assembled,
        outputs: &outputs,
        download: Some(&report),
        elapsed: started.elapsed(),
    }
    .to_string())
}
