//! GitHub repository ingestion (spec Section 4.1, 4.4).
//!
//! Clones with a bounded depth and timeout, then walks the result through
//! the same file-count/size/depth/dangerous-extension ceilings the
//! archive ingestor applies before extraction.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pipeguard_core::InputType;
use pipeguard_safety::{walk_repository, WalkLimits};
use tokio::process::Command;
use tracing::info;

use super::{IngestError, Ingestor, Result};
use crate::workspace::WorkspaceHandle;

pub struct RepoIngestor {
    url: String,
    clone_timeout: Duration,
    max_depth_history: u32,
    full_history: bool,
    keep_git: bool,
    walk_limits: WalkLimits,
}

impl RepoIngestor {
    pub fn new(
        url: String,
        clone_timeout: Duration,
        max_depth_history: u32,
        full_history: bool,
        keep_git: bool,
        walk_limits: WalkLimits,
    ) -> Self {
        Self { url, clone_timeout, max_depth_history, full_history, keep_git, walk_limits }
    }

    /// `https://github.com/<owner>/<repo>`, exactly two non-empty path
    /// segments, nothing else.
    fn validate_url(url: &str) -> Result<()> {
        let rest = url.strip_prefix("https://github.com/").ok_or(IngestError::InvalidRepositoryUrl)?;
        let rest = rest.strip_suffix(".git").unwrap_or(rest);
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() != 2 || rest.contains("..") {
            return Err(IngestError::InvalidRepositoryUrl);
        }
        Ok(())
    }
}

#[async_trait]
impl Ingestor for RepoIngestor {
    async fn materialize(&self, workspace: &WorkspaceHandle) -> Result<()> {
        Self::validate_url(&self.url)?;

        let mut args: Vec<String> = vec!["clone".into(), "--single-branch".into(), "--no-tags".into()];
        if !self.full_history {
            args.push("--depth".into());
            args.push(self.max_depth_history.to_string());
        }
        args.push(self.url.clone());
        args.push(".".into());

        let mut cmd = Command::new("git");
        cmd.args(&args)
            .current_dir(&workspace.source_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(self.clone_timeout, cmd.output())
            .await
            .map_err(|_| IngestError::CloneTimeout)??;

        if !output.status.success() {
            return Err(IngestError::CloneFailed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        if !self.keep_git {
            let git_dir = workspace.source_dir.join(".git");
            if git_dir.exists() {
                std::fs::remove_dir_all(&git_dir)?;
            }
        }

        walk_repository(&workspace.source_dir, self.walk_limits)?;
        info!(job_id = %workspace.job_id, url = %self.url, "repository materialized");
        Ok(())
    }

    fn input_type(&self) -> InputType {
        InputType::Github
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_well_formed_github_url() {
        assert!(RepoIngestor::validate_url("https://github.com/acme/widgets").is_ok());
        assert!(RepoIngestor::validate_url("https://github.com/acme/widgets.git").is_ok());
    }

    #[test]
    fn rejects_urls_with_extra_path_segments() {
        assert!(RepoIngestor::validate_url("https://github.com/acme/widgets/tree/main").is_err());
    }

    #[test]
    fn rejects_non_github_hosts() {
        assert!(RepoIngestor::validate_url("https://gitlab.com/acme/widgets").is_err());
    }

    #[test]
    fn rejects_urls_missing_a_repo_segment() {
        assert!(RepoIngestor::validate_url("https://github.com/acme").is_err());
    }

    #[test]
    fn rejects_traversal_attempts_in_the_path() {
        assert!(RepoIngestor::validate_url("https://github.com/acme/../evil").is_err());
    }
}
