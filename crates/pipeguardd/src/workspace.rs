//! Workspace manager (spec Section 4.2): allocation, layout, and cleanup
//! of per-job directories; monotonically numbered job identifiers.

use std::io;
use std::path::{Path, PathBuf};

use pipeguard_core::{Config, InputType, JobId};
use tracing::warn;

/// Opaque handle to a materialized job workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceHandle {
    pub job_id: JobId,
    pub job_dir: PathBuf,
    pub source_dir: PathBuf,
    pub input_type: InputType,
}

impl WorkspaceHandle {
    pub fn pipelines_dir(&self) -> PathBuf {
        self.job_dir.join("pipelines")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.job_dir.join("reports")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.job_dir.join("metadata.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.job_dir.join("state.json")
    }
}

/// Count existing `job-*` directories directly under `workspaces_dir`.
fn count_existing_jobs(workspaces_dir: &Path) -> io::Result<u32> {
    if !workspaces_dir.exists() {
        return Ok(0);
    }
    let mut count = 0u32;
    for entry in std::fs::read_dir(workspaces_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with("job-") {
                    count += 1;
                }
            }
        }
    }
    Ok(count)
}

/// Allocate the next job directory via exclusive creation, regenerating
/// the candidate id on a collision (spec Section 3: "Generation races are
/// resolved by exclusive directory creation (re-generate on collision)").
fn allocate_job_dir(workspaces_dir: &Path) -> io::Result<(JobId, PathBuf)> {
    std::fs::create_dir_all(workspaces_dir)?;
    loop {
        let next = count_existing_jobs(workspaces_dir)? + 1;
        let job_id = JobId::from_sequence(next);
        let job_dir = workspaces_dir.join(job_id.as_str());
        match std::fs::create_dir(&job_dir) {
            Ok(()) => return Ok((job_id, job_dir)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Create a new per-job workspace: `job-NNN/{source,pipelines,reports}`.
pub fn create_workspace(config: &Config, input_type: InputType) -> io::Result<WorkspaceHandle> {
    let (job_id, job_dir) = allocate_job_dir(&config.workspaces_dir)?;
    let source_dir = job_dir.join("source");
    std::fs::create_dir_all(&source_dir)?;
    std::fs::create_dir_all(job_dir.join("pipelines"))?;
    Ok(WorkspaceHandle { job_id, job_dir, source_dir, input_type })
}

/// Recursively remove a job workspace. Tolerant of absent paths and of
/// read-only files left behind by an extracted archive (spec Section 4.2).
pub fn cleanup_workspace(handle: &WorkspaceHandle) -> io::Result<()> {
    remove_dir_all_tolerant(&handle.job_dir)
}

fn remove_dir_all_tolerant(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    make_writable_recursive(dir);
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "failed to remove workspace directory");
            Err(e)
        }
    }
}

fn make_writable_recursive(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if let Ok(metadata) = entry.metadata() {
            let mut perms = metadata.permissions();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                perms.set_mode(if metadata.is_dir() { 0o777 } else { 0o666 });
            }
            #[cfg(not(unix))]
            {
                perms.set_readonly(false);
            }
            let _ = std::fs::set_permissions(&path, perms);
        }
        if path.is_dir() {
            make_writable_recursive(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.workspaces_dir = root.to_path_buf();
        config
    }

    #[test]
    fn allocates_zero_padded_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let first = create_workspace(&config, InputType::Zip).unwrap();
        let second = create_workspace(&config, InputType::Zip).unwrap();

        assert_eq!(first.job_id.as_str(), "job-001");
        assert_eq!(second.job_id.as_str(), "job-002");
    }

    #[test]
    fn creates_source_and_pipelines_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let handle = create_workspace(&config, InputType::Github).unwrap();

        assert!(handle.source_dir.is_dir());
        assert!(handle.pipelines_dir().is_dir());
    }

    #[test]
    fn cleanup_removes_the_whole_job_directory_and_tolerates_double_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let handle = create_workspace(&config, InputType::Zip).unwrap();
        std::fs::write(handle.source_dir.join("pom.xml"), b"<project/>").unwrap();

        cleanup_workspace(&handle).unwrap();
        assert!(!handle.job_dir.exists());

        // Cleaning up an already-removed workspace is a no-op, not an error.
        cleanup_workspace(&handle).unwrap();
    }

    #[test]
    fn cleanup_tolerates_read_only_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let handle = create_workspace(&config, InputType::Zip).unwrap();
        let file = handle.source_dir.join("readonly.txt");
        std::fs::write(&file, b"data").unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&file).unwrap().permissions();
            perms.set_mode(0o444);
            std::fs::set_permissions(&file, perms).unwrap();
        }

        cleanup_workspace(&handle).unwrap();
        assert!(!handle.job_dir.exists());
    }
}
