use super::{VerificationOutcome, VerificationService};
use crate::config::VerificationConfig;
use crate::error::VerifyError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use url::Url;

const API_KEY_HEADER: &str = "API-Key";

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "jobId", alias = "uuid")]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    status: Option<String>,
    #[serde(alias = "positives")]
    positive_count: Option<u32>,
    #[serde(default, alias = "redirectChain")]
    redirect_chain: Vec<String>,
    #[serde(default, alias = "securityHeaders")]
    security_headers: BTreeMap<String, String>,
    #[serde(alias = "message", alias = "error")]
    reason: Option<String>,
}

/// HTTP client for the verification backend.
///
/// `POST {api_url}scan` with `{"url": …}` answers `{"job_id": …}`;
/// `GET {api_url}result/{job_id}` answers a status envelope.
pub struct HttpVerificationClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpVerificationClient {
    pub fn new(config: &VerificationConfig) -> Result<Self, VerifyError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("scanguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        let base_url = Url::parse(&config.api_url)
            .map_err(|e| VerifyError::Service(format!("invalid api_url: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key(),
        })
    }

    /// Append `segments` below the base path. Each segment is percent-encoded
    /// on its own, so ids from the backend cannot leave the API prefix.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, VerifyError> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(VerifyError::Service(format!("invalid path segment {bad:?}")));
        }

        let no_path = || VerifyError::Service(format!("api_url has no path: {}", self.base_url));
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| no_path())?
            .pop_if_empty()
            .extend(segments.iter().copied());
        Ok(url)
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

fn transport(err: reqwest::Error) -> VerifyError {
    VerifyError::Transport(err.to_string())
}

/// Rate limiting and server-side failures are transient; other non-success
/// statuses mean the request itself was rejected.
fn check_status(status: StatusCode) -> Result<(), VerifyError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(VerifyError::Transport(format!("backend returned {status}")))
    } else {
        Err(VerifyError::Service(format!("backend returned {status}")))
    }
}

fn parse_submit(body: &str) -> Result<String, VerifyError> {
    let response: SubmitResponse = serde_json::from_str(body)
        .map_err(|e| VerifyError::Service(format!("unreadable submit response: {e}")))?;
    match response.job_id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(VerifyError::Service(
            "submit response lacks a job id".to_string(),
        )),
    }
}

fn parse_result(job_id: &str, body: &str) -> Result<VerificationOutcome, VerifyError> {
    let response: ResultResponse = serde_json::from_str(body)
        .map_err(|e| VerifyError::Service(format!("unreadable result response: {e}")))?;

    let status = response
        .status
        .as_deref()
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    match status.as_str() {
        "pending" | "queued" | "processing" | "running" => Ok(VerificationOutcome::Pending {
            job_id: job_id.to_string(),
        }),
        "complete" | "completed" | "done" => {
            let positive_count = response.positive_count.ok_or_else(|| {
                VerifyError::Service("complete result lacks a positives count".to_string())
            })?;
            Ok(VerificationOutcome::Complete {
                positive_count,
                redirect_chain: response.redirect_chain,
                security_headers: response.security_headers,
            })
        }
        "failed" | "error" => Ok(VerificationOutcome::Failed {
            reason: response
                .reason
                .unwrap_or_else(|| "verification failed".to_string()),
        }),
        "" => Err(VerifyError::Service(
            "result response lacks a status".to_string(),
        )),
        other => Err(VerifyError::Service(format!("unknown result status: {other}"))),
    }
}

#[async_trait]
impl VerificationService for HttpVerificationClient {
    async fn submit(&self, url: &str) -> Result<String, VerifyError> {
        let endpoint = self.endpoint(&["scan"])?;
        log::debug!("Submitting URL for verification to {endpoint}");

        let response = self
            .with_auth(self.client.post(endpoint))
            .json(&json!({ "url": url }))
            .send()
            .await
            .map_err(transport)?;
        check_status(response.status())?;

        let body = response.text().await.map_err(transport)?;
        parse_submit(&body)
    }

    async fn fetch_verdict(&self, job_id: &str) -> Result<VerificationOutcome, VerifyError> {
        let endpoint = self.endpoint(&["result", job_id])?;
        log::debug!("Fetching verdict for job {job_id}");

        let response = self
            .with_auth(self.client.get(endpoint))
            .send()
            .await
            .map_err(transport)?;

        // The result resource only exists once the backend has picked the job up
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(VerificationOutcome::Pending {
                job_id: job_id.to_string(),
            });
        }
        check_status(response.status())?;

        let body = response.text().await.map_err(transport)?;
        parse_result(job_id, &body)
    }
}
