//! The `Ingestor` capability: the trait boundary between "where did the
//! project come from" and the rest of admission (spec Section 9, "Design
//! Notes"). `ArchiveIngestor` materializes an uploaded ZIP; `RepoIngestor`
//! clones a GitHub repository. Both leave `workspace.source_dir` populated
//! and enforce the same untrusted-input ceilings (spec Section 4.1).

mod archive;
mod repo;

pub use archive::ArchiveIngestor;
pub use repo::RepoIngestor;

use async_trait::async_trait;
use pipeguard_core::InputType;
use thiserror::Error;

use crate::workspace::WorkspaceHandle;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("uploaded file is not a valid ZIP archive")]
    InvalidSignature,
    #[error("archive contains more than the allowed number of entries")]
    TooManyEntries,
    #[error("archive would expand past the allowed uncompressed size")]
    UncompressedSizeExceeded,
    #[error("archive entry path escapes the extraction root: {0}")]
    PathTraversal(String),
    #[error("archive entry is a symlink: {0}")]
    SymlinkEntry(String),
    #[error("archive entry has a disallowed extension: {0}")]
    DangerousEntry(String),
    #[error("archive entry nesting is too deep: {0}")]
    TooDeep(String),
    #[error("repository URL is not a valid https://github.com/<owner>/<repo> reference")]
    InvalidRepositoryUrl,
    #[error("git clone timed out")]
    CloneTimeout,
    #[error("git clone failed: {0}")]
    CloneFailed(String),
    #[error("{0}")]
    Walk(#[from] pipeguard_safety::WalkViolation),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Materializes project source into `workspace.source_dir`.
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn materialize(&self, workspace: &WorkspaceHandle) -> Result<()>;
    fn input_type(&self) -> InputType;
}
