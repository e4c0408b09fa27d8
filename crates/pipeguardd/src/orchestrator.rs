//! Orchestrator (spec Section 4.8): the single entry point the HTTP layer
//! calls. Sequences ingest -> admit -> install -> enqueue and guarantees
//! workspace cleanup on any failure.

use pipeguard_core::{Config, JobMetadata};
use thiserror::Error;
use tracing::{error, info};

use crate::admission::{self, AdmissionError, SubmissionRequest};
use crate::ingest::{IngestError, Ingestor};
use crate::installer::{self, InstallError};
use crate::queue::JobQueue;
use crate::workspace::{cleanup_workspace, create_workspace};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("ingestion failed: {0}")]
    Ingest(#[from] IngestError),
    #[error("admission failed: {0}")]
    Admission(#[from] AdmissionError),
    #[error("pipeline installation failed: {0}")]
    Install(#[from] InstallError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// `{ingest -> inject default database config if stack.requires_db -> admit -> install -> enqueue}`
/// (spec Section 4.8). Any step failing tears the workspace down and
/// re-raises.
pub async fn submit(
    config: &Config,
    ingestor: &dyn Ingestor,
    mut request: SubmissionRequest,
    queue: &dyn JobQueue,
) -> Result<JobMetadata> {
    if request.stack.requires_db {
        request.database = Some(config.default_database_config.clone());
    }

    let workspace = create_workspace(config, ingestor.input_type())?;

    let result = run_submission(config, &workspace, ingestor, request, queue).await;

    match result {
        Ok(metadata) => Ok(metadata),
        Err(e) => {
            error!(job_id = %workspace.job_id, error = %e, "submission failed, rolling back workspace");
            let _ = cleanup_workspace(&workspace);
            Err(e)
        }
    }
}

async fn run_submission(
    config: &Config,
    workspace: &crate::workspace::WorkspaceHandle,
    ingestor: &dyn Ingestor,
    request: SubmissionRequest,
    queue: &dyn JobQueue,
) -> Result<JobMetadata> {
    ingestor.materialize(workspace).await?;

    let metadata = admission::admit(workspace, &config.pipeline_templates_dir, request)?;
    installer::install(&config.pipeline_templates_dir, &workspace.pipelines_dir(), &metadata.stack)?;

    queue.enqueue(workspace.job_id.clone()).await;
    info!(job_id = %workspace.job_id, "job enqueued");
    Ok(metadata)
}
