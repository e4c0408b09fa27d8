//! Recursive repository walk enforcing file/byte/depth ceilings
//! (spec Section 4.1, used by the repository ingestor after clone).

use std::path::Path;

use thiserror::Error;
use walkdir::WalkDir;

use crate::content::dangerous_extension;
use crate::path::path_depth;

#[derive(Debug, Clone, Copy)]
pub struct WalkLimits {
    pub max_files: usize,
    pub max_bytes: u64,
    pub max_depth: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalkViolation {
    #[error("repository contains too many files (limit {limit})")]
    TooManyFiles { limit: usize },
    #[error("repository size limit exceeded (limit {limit} bytes)")]
    TooLarge { limit: u64 },
    #[error("repository directory depth exceeded (limit {limit}, path {path})")]
    TooDeep { limit: usize, path: String },
    #[error("dangerous file type detected: {0}")]
    DangerousFile(String),
    #[error("io error walking repository: {0}")]
    Io(String),
}

/// Walk `root`, enforcing `limits`. Stops at the first violation.
pub fn walk_repository(root: &Path, limits: WalkLimits) -> Result<(), WalkViolation> {
    let mut total_bytes: u64 = 0;
    let mut file_count: usize = 0;

    for entry in WalkDir::new(root).into_iter() {
        let entry = entry.map_err(|e| WalkViolation::Io(e.to_string()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        file_count += 1;
        if file_count > limits.max_files {
            return Err(WalkViolation::TooManyFiles { limit: limits.max_files });
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let depth = path_depth(&relative.to_string_lossy());
        if depth > limits.max_depth {
            return Err(WalkViolation::TooDeep {
                limit: limits.max_depth,
                path: relative.display().to_string(),
            });
        }

        let size = entry.metadata().map_err(|e| WalkViolation::Io(e.to_string()))?.len();
        total_bytes += size;
        if total_bytes > limits.max_bytes {
            return Err(WalkViolation::TooLarge { limit: limits.max_bytes });
        }

        let file_name = entry.file_name().to_string_lossy();
        if dangerous_extension(&file_name).is_some() {
            return Err(WalkViolation::DangerousFile(file_name.to_string()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn limits() -> WalkLimits {
        WalkLimits { max_files: 10, max_bytes: 1024, max_depth: 5 }
    }

    #[test]
    fn accepts_a_small_well_formed_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pom.xml"), b"<project/>").unwrap();
        fs::create_dir_all(dir.path().join("src/main/java")).unwrap();
        fs::write(dir.path().join("src/main/java/Main.java"), b"class Main {}").unwrap();

        assert!(walk_repository(dir.path(), limits()).is_ok());
    }

    #[test]
    fn rejects_when_file_count_exceeds_limit() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..11 {
            fs::write(dir.path().join(format!("f{i}.txt")), b"x").unwrap();
        }
        let err = walk_repository(dir.path(), limits()).unwrap_err();
        assert_eq!(err, WalkViolation::TooManyFiles { limit: 10 });
    }

    #[test]
    fn rejects_when_cumulative_size_exceeds_limit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.bin.txt"), vec![0u8; 2048]).unwrap();
        let err = walk_repository(dir.path(), limits()).unwrap_err();
        assert_eq!(err, WalkViolation::TooLarge { limit: 1024 });
    }

    #[test]
    fn rejects_when_depth_exceeds_limit() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a/b/c/d/e/f");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("leaf.txt"), b"x").unwrap();
        let err = walk_repository(dir.path(), limits()).unwrap_err();
        assert!(matches!(err, WalkViolation::TooDeep { limit: 5, .. }));
    }

    #[test]
    fn rejects_dangerous_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("payload.exe"), b"x").unwrap();
        let err = walk_repository(dir.path(), limits()).unwrap_err();
        assert_eq!(err, WalkViolation::DangerousFile("payload.exe".to_string()));
    }
}
