//! Cross-cutting error taxonomy (spec Section 7).
//!
//! Component-local error enums (`SafetyError`, `IngestError`, ...) convert
//! into this taxonomy at the HTTP boundary via `#[from]`, the way a single
//! category decides the status code a client sees.

use thiserror::Error;

/// User-visible error category, independent of which component raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 400 - malformed input, structural/contract violation at the edge.
    InputValidation,
    /// 400 - the structure validator refused the source tree.
    StructuralRefusal,
    /// 404 - unknown job, missing reports, or a stage that was never run.
    NotFound,
    /// 409 - reports/logs requested before they exist.
    Conflict,
    /// 500 - metadata.json missing or unreadable.
    InternalCorruption,
    /// Internal - container runtime, clone timeout, missing result.json,
    /// unsupported stack, compose fragment absent. Always ends a job FAILED.
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input validation failed: {0}")]
    InputValidation(String),

    #[error("structural refusal: {}", .0.join("; "))]
    StructuralRefusal(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal corruption: {0}")]
    InternalCorruption(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InputValidation(_) | Self::Io(_) | Self::Json(_) => ErrorCategory::InputValidation,
            Self::StructuralRefusal(_) => ErrorCategory::StructuralRefusal,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::InternalCorruption(_) => ErrorCategory::InternalCorruption,
            Self::Infrastructure(_) => ErrorCategory::Infrastructure,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
