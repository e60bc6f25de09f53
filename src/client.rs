//
// client.rs
// Dicom-Inference-Client
//
// Submits anonymized batches to the inference service, polls job status, and checks credentials.
//
// Thales Matheus Mendonça Santos - November 2025

use std::time::Duration;

use rayon::prelude::*;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};

use crate::anonymize::Anonymizer;
use crate::archive::{self, ArchiveEntry};
use crate::codec;
use crate::config::ServiceConfig;
use crate::dicom_access::Record;
use crate::error::{Error, Result};
use crate::models::{JobHandle, JobOutcome, Submission, COMPLETE_PERCENT, IN_PROGRESS_PERCENT};
use crate::retry::RetryPolicy;

pub const LICENSE_HEADER: &str = "X-License-Key";

/// Pooled HTTP connections with the fixed per-call timeout.
#[derive(Debug)]
struct ConnectionPool {
    http: reqwest::Client,
}

impl ConnectionPool {
    fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

/// Builds requests against the service root, carrying the license header.
#[derive(Debug)]
struct RequestIssuer {
    base_url: String,
    license: HeaderValue,
}

impl RequestIssuer {
    fn new(base_url: &str, license: &SecretString) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Configuration("service base URL is empty".into()));
        }
        let mut license = HeaderValue::from_str(license.expose_secret())
            .map_err(|_| Error::Configuration("license contains invalid characters".into()))?;
        license.set_sensitive(true);
        Ok(Self { base_url, license })
    }

    fn request(&self, pool: &ConnectionPool, method: Method, path: &str) -> reqwest::RequestBuilder {
        pool.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(LICENSE_HEADER, self.license.clone())
    }
}

/// Client for one inference service.
///
/// Owns its transport exclusively. Resources are created pool, retry, issuer; fields are
/// declared in the opposite order so they are released issuer first, pool last.
pub struct JobClient {
    issuer: RequestIssuer,
    retry: RetryPolicy,
    pool: ConnectionPool,
    anonymizer: Anonymizer,
}

impl JobClient {
    /// `anonymizer` is the service-level engine applied to every outbound record.
    pub fn new(config: &ServiceConfig, anonymizer: Anonymizer) -> Result<Self> {
        let pool = ConnectionPool::new(Duration::from_secs(config.timeout_seconds))?;
        let retry = RetryPolicy::new(config.retry.clone())?;
        let issuer = RequestIssuer::new(&config.base_url, &config.license)?;
        tracing::debug!(base_url = %issuer.base_url, "Inference client ready");

        Ok(Self {
            issuer,
            retry,
            pool,
            anonymizer,
        })
    }

    pub fn anonymizer(&self) -> &Anonymizer {
        &self.anonymizer
    }

    /// Release transport resources explicitly, issuer first.
    pub fn shutdown(self) {
        let JobClient {
            issuer,
            retry,
            pool,
            anonymizer: _,
        } = self;
        drop(issuer);
        drop(retry);
        drop(pool);
        tracing::debug!("Inference client shut down");
    }

    async fn send(&self, method: Method, path: &str, body: Option<&[u8]>) -> Result<Response> {
        self.retry
            .run(|| {
                let mut request = self.issuer.request(&self.pool, method.clone(), path);
                if let Some(bytes) = body {
                    request = request
                        .header(CONTENT_TYPE, "application/zip")
                        .body(bytes.to_vec());
                }
                async move { request.send().await.map_err(Error::from) }
            })
            .await
    }

    /// Anonymize, pack, and upload every channel for `model_id`.
    pub async fn submit(&self, model_id: &str, channels: &[Vec<Record>]) -> Result<Submission> {
        if channels.is_empty() {
            return Err(Error::MissingArgument("channels"));
        }
        if let Some(idx) = channels.iter().position(|c| c.is_empty()) {
            return Err(Error::EmptyChannel(idx));
        }

        // Anonymizing and compressing is CPU-bound; keep it off the async workers.
        let anonymizer = self.anonymizer.clone();
        let owned = channels.to_vec();
        let (anonymized, body, records) =
            tokio::task::spawn_blocking(move || pack_channels(&anonymizer, &owned))
                .await
                .map_err(|e| Error::Codec(format!("packing task failed: {}", e)))??;
        tracing::info!(
            model_id,
            channels = channels.len(),
            records,
            bytes = body.len(),
            "Submitting job"
        );

        let path = format!("/v1/model/start/{}", model_id);
        let resp = self.send(Method::POST, &path, Some(&body)).await?;
        let status = resp.status();

        if status.is_success() {
            let job_id = resp.text().await?.trim().to_string();
            if job_id.is_empty() {
                return Err(Error::ServiceError {
                    status: status.as_u16(),
                    reason: "empty job id in response".into(),
                });
            }
            tracing::info!(model_id, job_id = %job_id, "Job accepted");
            return Ok(Submission {
                handle: JobHandle::new(model_id, job_id),
                sent: anonymized.into_iter().flatten().collect(),
            });
        }

        let reason = reason_phrase(status);
        let detail = resp.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            let message = if detail.trim().is_empty() {
                reason
            } else {
                detail.trim().to_string()
            };
            return Err(Error::InvalidRequest(message));
        }
        Err(Error::ServiceError {
            status: status.as_u16(),
            reason,
        })
    }

    /// Poll once and report the raw four-way outcome.
    pub async fn poll_outcome(&self, handle: &JobHandle) -> Result<JobOutcome> {
        let path = format!("/v1/model/results/{}", handle.segmentation_id);
        let resp = match self.send(Method::GET, &path, None).await {
            Ok(resp) => resp,
            Err(Error::Transport(reason)) => return Ok(JobOutcome::TransportError { reason }),
            Err(e) => return Err(e),
        };
        let status = resp.status();
        let body = resp.bytes().await?;
        let outcome = interpret_poll(status, &body)?;

        tracing::debug!(
            model_id = %handle.model_id,
            job_id = %handle.segmentation_id,
            status = status.as_u16(),
            terminal = outcome.is_terminal(),
            "Polled job"
        );
        Ok(outcome)
    }

    /// Poll once; not-found and transport failures are returned as errors.
    pub async fn poll(&self, handle: &JobHandle) -> Result<JobOutcome> {
        self.poll_outcome(handle).await?.into_result(handle)
    }

    /// Poll sequentially until the job completes, fails, or `max_polls` is reached.
    pub async fn wait_for_result(
        &self,
        handle: &JobHandle,
        interval: Duration,
        max_polls: usize,
    ) -> Result<Record> {
        for attempt in 1..=max_polls {
            match self.poll(handle).await? {
                JobOutcome::Complete { record, .. } => return Ok(record),
                JobOutcome::InProgress { message, .. } => {
                    tracing::info!(job_id = %handle.segmentation_id, attempt, message = %message, "Job in progress");
                    if attempt < max_polls {
                        tokio::time::sleep(interval).await;
                    }
                }
                other => return Err(Error::Transport(format!("unexpected outcome {:?}", other))),
            }
        }
        Err(Error::Transport(format!(
            "job {} still in progress after {} polls",
            handle.segmentation_id, max_polls
        )))
    }

    /// Liveness and credential check.
    pub async fn ping(&self) -> Result<()> {
        let resp = self.send(Method::GET, "/v1/ping", None).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::FORBIDDEN {
            return Err(Error::InvalidCredential);
        }
        Err(Error::Transport(reason_phrase(status)))
    }
}

/// Anonymize every channel and pack the result into one upload archive.
fn pack_channels(
    anonymizer: &Anonymizer,
    channels: &[Vec<Record>],
) -> Result<(Vec<Vec<Record>>, Vec<u8>, usize)> {
    let anonymized: Vec<Vec<Record>> = channels
        .par_iter()
        .map(|channel| anonymizer.anonymize_batch(channel))
        .collect();

    let mut entries = Vec::new();
    for (c, channel) in anonymized.iter().enumerate() {
        for (i, record) in channel.iter().enumerate() {
            entries.push(ArchiveEntry::new(
                format!("channel_{}/image_{}.dcm", c, i),
                codec::encode(record)?,
            ));
        }
    }
    let body = archive::compress(&entries)?;
    Ok((anonymized, body, entries.len()))
}

/// Map one status response onto the job state machine.
pub fn interpret_poll(status: StatusCode, body: &[u8]) -> Result<JobOutcome> {
    match status {
        StatusCode::ACCEPTED => Ok(JobOutcome::InProgress {
            progress_percent: IN_PROGRESS_PERCENT,
            message: String::from_utf8_lossy(body).trim().to_string(),
        }),
        StatusCode::OK => {
            let mut entries = archive::decompress(body)
                .map_err(|e| Error::UnsupportedPayload(e.to_string()))?;
            if entries.len() != 1 {
                return Err(Error::UnsupportedPayload(format!(
                    "expected exactly one entry, found {}",
                    entries.len()
                )));
            }
            let entry = entries.remove(0);
            let record = codec::decode(&entry.data).map_err(|e| {
                Error::UnsupportedPayload(format!("entry {} is not a record: {}", entry.name, e))
            })?;
            Ok(JobOutcome::Complete {
                progress_percent: COMPLETE_PERCENT,
                record,
            })
        }
        StatusCode::NOT_FOUND => Ok(JobOutcome::NotFound),
        other => Ok(JobOutcome::TransportError {
            reason: reason_phrase(other),
        }),
    }
}

fn reason_phrase(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}
