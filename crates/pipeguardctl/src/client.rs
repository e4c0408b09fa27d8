//! HTTP client for pipeguardd.
//!
//! Communicates with the daemon via its local HTTP API (spec Section 6).

use std::path::Path;

use pipeguard_core::{JobMetadata, Pipeline, Stack, Versions};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running at {addr}\n  → start with: pipeguardd")]
    ConnectionFailed { addr: String },
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    #[error("unauthorized: check PIPEGUARD_TOKEN env var or --token flag")]
    Unauthorized,
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("request transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct SubmissionMetadata {
    stack: Stack,
    #[serde(skip_serializing_if = "is_default_versions")]
    versions: Versions,
    pipeline: Pipeline,
}

fn is_default_versions(v: &Versions) -> bool {
    v.language.is_none() && v.build_tool.is_none()
}

#[derive(Debug, Serialize)]
struct GithubSubmission {
    github_url: String,
    stack: Stack,
    #[serde(skip_serializing_if = "is_default_versions")]
    versions: Versions,
    pipeline: Pipeline,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusResponse {
    pub job: JobMetadata,
    pub execution: Value,
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(addr: &str, token: Option<&str>) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| ClientError::HttpError {
                status: 0,
                message: e.to_string(),
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self { http, base_url: addr.trim_end_matches('/').to_string() })
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 401 {
            return Err(ClientError::Unauthorized);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
        };
        if status.as_u16() == 404 {
            return Err(ClientError::NotFound(message));
        }
        Err(ClientError::HttpError { status: status.as_u16(), message })
    }

    pub async fn submit_zip(&self, path: &Path, stack: Stack, versions: Versions, pipeline: Pipeline) -> Result<JobMetadata, ClientError> {
        let bytes = tokio::fs::read(path).await?;
        let metadata = serde_json::to_string(&SubmissionMetadata { stack, versions, pipeline }).expect("serializable metadata");

        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("project.zip").to_string();
        let form = reqwest::multipart::Form::new()
            .part("project_zip", reqwest::multipart::Part::bytes(bytes).file_name(filename))
            .text("metadata", metadata);

        let url = format!("{}/api/jobs/upload", self.base_url);
        let response = self.http.post(&url).multipart(form).send().await.map_err(|e| self.connection_error(e))?;
        let response = self.check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn submit_github(
        &self,
        github_url: String,
        stack: Stack,
        versions: Versions,
        pipeline: Pipeline,
    ) -> Result<JobMetadata, ClientError> {
        let body = GithubSubmission { github_url, stack, versions, pipeline };
        let url = format!("{}/api/jobs/github", self.base_url);
        let response = self.http.post(&url).json(&body).send().await.map_err(|e| self.connection_error(e))?;
        let response = self.check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn status(&self, job_id: &str) -> Result<StatusResponse, ClientError> {
        let url = format!("{}/api/jobs/{job_id}/status", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|e| self.connection_error(e))?;
        let response = self.check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn reports(&self, job_id: &str) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}/api/jobs/{job_id}/reports", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|e| self.connection_error(e))?;
        let response = self.check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn logs(&self, job_id: &str, stage: &str) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}/api/jobs/{job_id}/{stage}/logs", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|e| self.connection_error(e))?;
        let response = self.check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn connection_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_connect() {
            ClientError::ConnectionFailed { addr: self.base_url.clone() }
        } else {
            ClientError::Transport(e)
        }
    }
}
