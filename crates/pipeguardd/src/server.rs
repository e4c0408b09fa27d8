//! Status/reports HTTP surface. `axum` router bound to loopback by
//! default, with an optional bearer-token check.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pipeguard_core::{Config, ExecutionState, JobId, JobMetadata, Pipeline, Stack, Stage, Versions};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::admission::SubmissionRequest;
use crate::ingest::{ArchiveIngestor, RepoIngestor};
use crate::orchestrator::{self, OrchestratorError};
use crate::queue::JobQueue;

pub struct AppState {
    pub config: Config,
    pub queue: Arc<dyn JobQueue>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/jobs/upload", post(upload_job))
        .route("/api/jobs/github", post(github_job))
        .route("/api/jobs/{job_id}/status", get(job_status))
        .route("/api/jobs/{job_id}/reports", get(job_reports))
        .route("/api/jobs/{job_id}/{stage}/logs", get(stage_logs))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Submission(#[from] OrchestratorError),
    #[error("unauthorized")]
    Unauthorized,
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("job metadata missing or corrupt: {0}")]
    InternalCorruption(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Submission(OrchestratorError::Ingest(_)) => StatusCode::BAD_REQUEST,
            Self::Submission(OrchestratorError::Admission(_)) => StatusCode::BAD_REQUEST,
            Self::Submission(OrchestratorError::Install(_) | OrchestratorError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InternalCorruption(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// A no-op when `Config::auth_token` is unset, otherwise requires a
/// matching `Authorization: Bearer <token>`.
fn check_auth(config: &Config, headers: &HeaderMap) -> std::result::Result<(), ApiError> {
    let Some(expected) = &config.auth_token else { return Ok(()) };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[derive(Debug, Deserialize)]
struct JobRequestMetadata {
    stack: Stack,
    #[serde(default)]
    versions: Versions,
    pipeline: Pipeline,
}

async fn upload_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> std::result::Result<Response, ApiError> {
    check_auth(&state.config, &headers)?;

    let mut zip_bytes: Option<Vec<u8>> = None;
    let mut metadata: Option<JobRequestMetadata> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.to_string()))? {
        match field.name() {
            Some("project_zip") => {
                zip_bytes = Some(field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?.to_vec());
            }
            Some("metadata") => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                metadata = Some(serde_json::from_str(&text).map_err(|e| ApiError::BadRequest(e.to_string()))?);
            }
            _ => {}
        }
    }

    let zip_bytes = zip_bytes.ok_or_else(|| ApiError::BadRequest("missing project_zip field".to_string()))?;
    let metadata = metadata.ok_or_else(|| ApiError::BadRequest("missing metadata field".to_string()))?;

    if zip_bytes.len() as u64 > state.config.max_upload_bytes {
        return Err(ApiError::BadRequest("upload exceeds MAX_UPLOAD_BYTES".to_string()));
    }

    let ingestor =
        ArchiveIngestor::new(zip_bytes, state.config.max_files, state.config.max_uncompressed_bytes, state.config.max_depth);
    let request = SubmissionRequest { stack: metadata.stack, versions: metadata.versions, pipeline: metadata.pipeline, database: None };

    let job = orchestrator::submit(&state.config, &ingestor, request, state.queue.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(job)).into_response())
}

#[derive(Debug, Deserialize)]
struct GithubJobRequest {
    github_url: String,
    stack: Stack,
    #[serde(default)]
    versions: Versions,
    pipeline: Pipeline,
}

async fn github_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<GithubJobRequest>,
) -> std::result::Result<Response, ApiError> {
    check_auth(&state.config, &headers)?;

    let full_history = body.pipeline.run_secret_scan && body.pipeline.secret_scan_mode == pipeguard_core::SecretScanMode::Git;
    let walk_limits = pipeguard_safety::WalkLimits {
        max_files: state.config.max_files,
        max_bytes: state.config.max_uncompressed_bytes,
        max_depth: state.config.max_depth,
    };
    let ingestor = RepoIngestor::new(
        body.github_url,
        state.config.git_clone_timeout,
        state.config.git_max_depth,
        full_history,
        full_history,
        walk_limits,
    );
    let request = SubmissionRequest { stack: body.stack, versions: body.versions, pipeline: body.pipeline, database: None };

    let job = orchestrator::submit(&state.config, &ingestor, request, state.queue.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(job)).into_response())
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    job: JobMetadata,
    execution: ExecutionState,
}

fn job_dir(config: &Config, job_id: &str) -> PathBuf {
    config.workspaces_dir.join(job_id)
}

fn load_metadata(config: &Config, job_id: &str) -> std::result::Result<JobMetadata, ApiError> {
    let dir = job_dir(config, job_id);
    if !dir.is_dir() {
        return Err(ApiError::NotFound(format!("no such job: {job_id}")));
    }
    pipeguard_core::json::read_json(&dir.join("metadata.json"))
        .map_err(|e| ApiError::InternalCorruption(format!("metadata.json unreadable: {e}")))
}

async fn job_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(job_id): AxumPath<String>,
) -> std::result::Result<Response, ApiError> {
    check_auth(&state.config, &headers)?;
    let metadata = load_metadata(&state.config, &job_id)?;

    let state_path = job_dir(&state.config, &job_id).join("state.json");
    let execution = if state_path.is_file() {
        pipeguard_core::json::read_json(&state_path)
            .map_err(|e| ApiError::InternalCorruption(format!("state.json unreadable: {e}")))?
    } else {
        ExecutionState::synthesize_queued(&metadata.pipeline)
    };

    Ok(Json(StatusResponse { job: metadata, execution }).into_response())
}

async fn job_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(job_id): AxumPath<String>,
) -> std::result::Result<Response, ApiError> {
    check_auth(&state.config, &headers)?;
    let _metadata = load_metadata(&state.config, &job_id)?;

    let dir = job_dir(&state.config, &job_id);
    let reports_dir = dir.join("reports");
    if !reports_dir.is_dir() {
        return Err(ApiError::NotFound("no reports directory for this job".to_string()));
    }

    let state_path = dir.join("state.json");
    if !state_path.is_file() {
        return Err(ApiError::Conflict("job has not started".to_string()));
    }
    let execution: ExecutionState = pipeguard_core::json::read_json(&state_path)
        .map_err(|e| ApiError::InternalCorruption(format!("state.json unreadable: {e}")))?;
    if execution.state == pipeguard_core::RunState::Running || execution.state == pipeguard_core::RunState::Queued {
        return Err(ApiError::Conflict("job is still running".to_string()));
    }

    let bytes = zip_directory(&reports_dir)?;
    Ok(([(axum::http::header::CONTENT_TYPE, "application/zip")], bytes).into_response())
}

fn zip_directory(dir: &std::path::Path) -> std::result::Result<Vec<u8>, ApiError> {
    use std::io::{Cursor, Write};

    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options = zip::write::FileOptions::default();
        for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            if relative.as_os_str().is_empty() {
                continue;
            }
            let name = relative.to_string_lossy().replace('\\', "/");
            if entry.file_type().is_dir() {
                writer
                    .add_directory(format!("{name}/"), options)
                    .map_err(|e| ApiError::Io(std::io::Error::other(e)))?;
            } else {
                writer
                    .start_file(name, options)
                    .map_err(|e| ApiError::Io(std::io::Error::other(e)))?;
                let contents = std::fs::read(entry.path())?;
                writer.write_all(&contents)?;
            }
        }
        writer
            .finish()
            .map_err(|e| ApiError::Io(std::io::Error::other(e)))?;
    }
    Ok(buf)
}

/// Per-stage file allow-list for the logs endpoint (spec Section 6).
fn log_candidates(stage: Stage) -> Vec<&'static str> {
    match stage {
        Stage::Secrets => vec!["secrets-dir.json", "secrets-git.json"],
        Stage::Sast => vec!["sast.json"],
        Stage::Build => vec!["build.log"],
        _ => vec!["result.json"],
    }
}

async fn stage_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath((job_id, stage_slug)): AxumPath<(String, String)>,
) -> std::result::Result<Response, ApiError> {
    check_auth(&state.config, &headers)?;
    let metadata = load_metadata(&state.config, &job_id)?;

    let stage = Stage::from_slug(&stage_slug).ok_or_else(|| ApiError::NotFound(format!("unknown stage: {stage_slug}")))?;
    if !metadata.pipeline.wants(stage) {
        return Err(ApiError::NotFound(format!("stage {stage} was skipped")));
    }

    let state_path = job_dir(&state.config, &job_id).join("state.json");
    if !state_path.is_file() {
        return Err(ApiError::Conflict("job has not started".to_string()));
    }
    let execution: ExecutionState = pipeguard_core::json::read_json(&state_path)
        .map_err(|e| ApiError::InternalCorruption(format!("state.json unreadable: {e}")))?;
    let stage_status = execution.stages.get(&stage).map(|s| s.status);
    if matches!(stage_status, Some(pipeguard_core::StageStatus::Pending) | Some(pipeguard_core::StageStatus::Running) | None) {
        return Err(ApiError::Conflict(format!("stage {stage} has not finished")));
    }

    let stage_dir = job_dir(&state.config, &job_id).join("reports").join(stage.slug());
    for candidate in log_candidates(stage) {
        let path = stage_dir.join(candidate);
        if path.is_file() {
            let bytes = std::fs::read(&path)?;
            return Ok(bytes.into_response());
        }
    }
    warn!(job_id = %job_id, %stage, "no log file matched the allow-list");
    Err(ApiError::NotFound(format!("no log file for stage {stage}")))
}
