//! Admission service (spec Section 4.6): precondition checks, structure
//! validation, and the atomic write of `metadata.json`.

use std::path::PathBuf;

use chrono::Utc;
use pipeguard_core::{InputType, JobMetadata, JobStatus, Pipeline, SecretScanMode, Stack, Versions};
use thiserror::Error;
use tracing::info;

use crate::validate::{validate, Contract, ValidationStatus};
use crate::workspace::WorkspaceHandle;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("secret_scan_mode=git requires a cloned repository, not a zip upload")]
    IncoherentSecretScanMode,
    #[error("structural validation refused the submission: {0:?}")]
    Refused(Vec<String>),
    #[error("no pipeline contract for stack {framework}-{build_tool}")]
    UnsupportedStack { framework: String, build_tool: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("contract is not valid JSON: {0}")]
    ContractInvalid(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Everything the client supplied about the submission, ahead of ingestion.
pub struct SubmissionRequest {
    pub stack: Stack,
    pub versions: Versions,
    pub pipeline: Pipeline,
    /// Set by the orchestrator from `Config::default_database_config` when
    /// `stack.requires_db` (spec Section 4.8); left `None` otherwise.
    pub database: Option<pipeguard_core::DatabaseConfig>,
}

/// Check preconditions that don't require touching the source tree (spec
/// Section 4.6: "a configuration error, not a structural one").
pub fn check_preconditions(request: &SubmissionRequest, input_type: InputType) -> Result<()> {
    if request.pipeline.run_secret_scan
        && request.pipeline.secret_scan_mode == SecretScanMode::Git
        && input_type == InputType::Zip
    {
        return Err(AdmissionError::IncoherentSecretScanMode);
    }
    Ok(())
}

fn contract_path(pipeline_templates_dir: &std::path::Path, stack: &Stack) -> PathBuf {
    pipeline_templates_dir.join(format!("{}-{}", stack.framework, stack.build_tool)).join("contract.json")
}

fn load_contract(pipeline_templates_dir: &std::path::Path, stack: &Stack) -> Result<Contract> {
    let path = contract_path(pipeline_templates_dir, stack);
    if !path.exists() {
        return Err(AdmissionError::UnsupportedStack {
            framework: stack.framework.clone(),
            build_tool: stack.build_tool.clone(),
        });
    }
    let raw = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Validate the materialized workspace and, on success, write
/// `metadata.json` atomically (spec Section 4.6, 3).
pub fn admit(
    workspace: &WorkspaceHandle,
    pipeline_templates_dir: &std::path::Path,
    request: SubmissionRequest,
) -> Result<JobMetadata> {
    check_preconditions(&request, workspace.input_type)?;

    let contract = load_contract(pipeline_templates_dir, &request.stack)?;
    let outcome = validate(&workspace.source_dir, &contract);

    if outcome.status() == ValidationStatus::Refused {
        return Err(AdmissionError::Refused(outcome.errors));
    }

    let status =
        if outcome.status() == ValidationStatus::AcceptedWithIssues { JobStatus::AcceptedWithIssues } else { JobStatus::Accepted };

    let metadata = JobMetadata {
        job_id: workspace.job_id.clone(),
        status,
        stack: request.stack,
        versions: request.versions,
        pipeline: request.pipeline,
        database: request.database,
        warnings: outcome.warnings,
        created_at: Utc::now(),
        input_type: workspace.input_type,
    };

    pipeguard_core::json::write_atomic(&workspace.metadata_path(), &metadata)?;
    info!(job_id = %workspace.job_id, status = ?metadata.status, "job admitted");
    Ok(metadata)
}
