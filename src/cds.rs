//! Copernicus Climate Data Store retrieve API client.

use std::{env, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::{
    download::{ArchiveClient, ArchiveRequest},
    error::{ConfigError, TransportError},
};

pub const DEFAULT_API_URL: &str = "https://cds.climate.copernicus.eu/api";

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub url: String,
    pub key: String,
}

impl Credentials {
    /// `CDSAPI_URL`/`CDSAPI_KEY`, falling back to `~/.cdsapirc`.
    pub fn load() -> Result<Self, ConfigError> {
        let from_file = dirs::home_dir()
            .map(|home| home.join(".cdsapirc"))
            .filter(|path| path.exists())
            .map(|path| Self::read_rc_file(&path))
            .transpose()?
            .unwrap_or((None, None));

        let url = env::var("CDSAPI_URL")
            .ok()
            .or(from_file.0)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let key = env::var("CDSAPI_KEY").ok().or(from_file.1).ok_or_else(|| {
            ConfigError::MissingCredentials("set CDSAPI_KEY or create ~/.cdsapirc".to_string())
        })?;

        Ok(Credentials {
            url: url.trim_end_matches('/').to_string(),
            key,
        })
    }

    fn read_rc_file(path: &Path) -> Result<(Option<String>, Option<String>), ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::MissingCredentials(format!("{}: {}", path.display(), e)))?;
        Ok(parse_rc(&text))
    }
}

/// Reads `url:` and `key:` lines.
pub fn parse_rc(text: &str) -> (Option<String>, Option<String>) {
    let mut url = None;
    let mut key = None;

    for line in text.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match name.trim() {
            "url" => url = Some(value.to_string()),
            "key" => key = Some(value.to_string()),
            _ => {}
        }
    }

    (url, key)
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    #[serde(rename = "jobID")]
    job_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: Asset,
}

#[derive(Debug, Deserialize)]
struct Asset {
    value: AssetValue,
}

#[derive(Debug, Deserialize)]
struct AssetValue {
    href: String,
}

pub struct CdsClient {
    client: Client,
    credentials: Credentials,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl CdsClient {
    pub fn new(credentials: Credentials, poll_interval: Duration, job_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(CdsClient {
            client,
            credentials,
            poll_interval,
            job_timeout,
        })
    }

    async fn submit(&self, request: &ArchiveRequest) -> Result<JobStatus, TransportError> {
        let url = format!(
            "{}/retrieve/v1/processes/{}/execution",
            self.credentials.url, request.dataset
        );
        let response = self
            .client
            .post(url)
            .header("PRIVATE-TOKEN", &self.credentials.key)
            .json(&json!({ "inputs": request.to_inputs() }))
            .send()
            .await?;

        read_json(check(response, Origin::Api).await?).await
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, TransportError> {
        let url = format!("{}/retrieve/v1/jobs/{}", self.credentials.url, job_id);
        let response = self
            .client
            .get(url)
            .header("PRIVATE-TOKEN", &self.credentials.key)
            .send()
            .await?;

        read_json(check(response, Origin::Api).await?).await
    }

    async fn wait_for(&self, mut job: JobStatus) -> Result<(), TransportError> {
        let started = Instant::now();

        loop {
            debug!(job = %job.job_id, status = %job.status, "Polled job");
            match job.status.as_str() {
                "successful" => return Ok(()),
                "failed" | "rejected" | "dismissed" => {
                    return Err(TransportError::JobFailed {
                        job: job.job_id,
                        status: job.status,
                    })
                }
                _ => {}
            }

            if started.elapsed() >= self.job_timeout {
                return Err(TransportError::Timeout {
                    job: job.job_id,
                    waited: started.elapsed(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
            job = self.status(&job.job_id).await?;
        }
    }

    async fn result_href(&self, job_id: &str) -> Result<String, TransportError> {
        let url = format!("{}/retrieve/v1/jobs/{}/results", self.credentials.url, job_id);
        let response = self
            .client
            .get(url)
            .header("PRIVATE-TOKEN", &self.credentials.key)
            .send()
            .await?;

        let results: JobResults = read_json(check(response, Origin::Api).await?).await?;
        Ok(results.asset.value.href)
    }
}

#[async_trait]
impl ArchiveClient for CdsClient {
    #[instrument(skip(self, request), fields(period = %request.period))]
    async fn fetch(&self, request: &ArchiveRequest) -> Result<Vec<u8>, TransportError> {
        let job = self.submit(request).await?;
        let job_id = job.job_id.clone();
        info!(job = %job_id, "Submitted archive request");

        self.wait_for(job).await?;
        let href = self.result_href(&job_id).await?;

        let response = self.client.get(&href).send().await?;
        let bytes = check(response, Origin::Asset).await?.bytes().await?;
        info!(job = %job_id, bytes = bytes.len(), "Fetched result");

        Ok(bytes.to_vec())
    }
}

/// Who answered a request. Only the retrieve API judges credentials; the
/// result asset sits behind a pre-signed link that can expire between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Api,
    Asset,
}

async fn check(response: Response, origin: Origin) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body, origin))
}

fn status_error(status: StatusCode, body: String, origin: Origin) -> TransportError {
    match (origin, status) {
        (Origin::Api, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => TransportError::Unauthorized(body),
        _ => TransportError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| TransportError::Protocol(e.to_string()))
}

// -- Tests -------------------------------------------------------------------
