//! Core domain types for the pipeline service.
//!
//! Holds the typed data model, process-wide configuration, the
//! cross-cutting error taxonomy, and the atomic write-then-rename
//! helper used by every component that persists JSON into a job
//! workspace.

pub mod config;
pub mod error;
pub mod json;
pub mod types;

pub use config::Config;
pub use error::PipelineError;
pub use types::{
    CustomToolConfig, DatabaseConfig, ExecutionState, InputType, JobId, JobMetadata, JobStatus,
    Pipeline, RunState, SastMode, SecretScanMode, Stack, Stage, StageResult, StageResultStatus,
    StageState, StageStatus, Versions, BLOCKING_STAGES, STAGE_ORDER,
};
