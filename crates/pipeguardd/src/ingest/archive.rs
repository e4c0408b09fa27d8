//! ZIP archive ingestion (spec Section 4.1, 4.3).
//!
//! Every check the safety crate exposes is applied per entry before a
//! single byte is written, and uncompressed size is tallied from the
//! bytes actually read rather than from the entry's declared size, so a
//! crafted `result.json`-style size lie can't hide a zip bomb behind it.

use std::io::{Cursor, Read};
use std::path::PathBuf;

use async_trait::async_trait;
use pipeguard_core::InputType;
use pipeguard_safety::{dangerous_extension, has_valid_zip_signature, is_symlink_unix_mode, path_depth, safe_extract_path};
use tracing::{info, warn};
use zip::ZipArchive;

use super::{IngestError, Ingestor, Result};
use crate::workspace::WorkspaceHandle;

pub struct ArchiveIngestor {
    bytes: Vec<u8>,
    max_files: usize,
    max_uncompressed_bytes: u64,
    max_depth: usize,
}

impl ArchiveIngestor {
    pub fn new(bytes: Vec<u8>, max_files: usize, max_uncompressed_bytes: u64, max_depth: usize) -> Self {
        Self { bytes, max_files, max_uncompressed_bytes, max_depth }
    }
}

#[async_trait]
impl Ingestor for ArchiveIngestor {
    async fn materialize(&self, workspace: &WorkspaceHandle) -> Result<()> {
        if !has_valid_zip_signature(&self.bytes[..self.bytes.len().min(4)]) {
            return Err(IngestError::InvalidSignature);
        }

        let mut archive = ZipArchive::new(Cursor::new(&self.bytes[..]))?;
        if archive.len() > self.max_files {
            return Err(IngestError::TooManyEntries);
        }

        let mut total_uncompressed: u64 = 0;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();

            if entry.is_dir() {
                continue;
            }

            let depth = path_depth(&name);
            if depth > self.max_depth {
                return Err(IngestError::TooDeep(name));
            }

            if let Some(mode) = entry.unix_mode() {
                if is_symlink_unix_mode(mode) {
                    return Err(IngestError::SymlinkEntry(name));
                }
            }

            if let Some(ext) = dangerous_extension(&name) {
                warn!(entry = %name, extension = ext, "rejecting dangerous archive entry");
                return Err(IngestError::DangerousEntry(name));
            }

            let target = safe_extract_path(&workspace.source_dir, &name)
                .map_err(|_| IngestError::PathTraversal(name.clone()))?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut out = std::fs::File::create(&target)?;
            let mut buf = [0u8; 64 * 1024];
            loop {
                let read = entry.read(&mut buf)?;
                if read == 0 {
                    break;
                }
                total_uncompressed += read as u64;
                if total_uncompressed > self.max_uncompressed_bytes {
                    drop(out);
                    let _ = std::fs::remove_file(&target);
                    return Err(IngestError::UncompressedSizeExceeded);
                }
                std::io::Write::write_all(&mut out, &buf[..read])?;
            }
        }

        lift_single_root(&workspace.source_dir)?;
        info!(job_id = %workspace.job_id, entries = archive.len(), "archive materialized");
        Ok(())
    }

    fn input_type(&self) -> InputType {
        InputType::Zip
    }
}

/// If `source_dir` contains exactly one entry and it is a directory, lift
/// its children up one level and remove the now-empty wrapper (spec
/// Section 4.3: "a single top-level wrapper directory is normalized
/// away").
fn lift_single_root(source_dir: &std::path::Path) -> std::io::Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(source_dir)?.filter_map(|e| e.ok().map(|e| e.path())).collect();
    if entries.len() != 1 {
        return Ok(());
    }
    let only = entries.remove(0);
    if !only.is_dir() {
        return Ok(());
    }

    for child in std::fs::read_dir(&only)? {
        let child = child?.path();
        let dest = source_dir.join(child.file_name().expect("entry has a file name"));
        std::fs::rename(&child, &dest)?;
    }
    std::fs::remove_dir(&only)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pipeguard_core::Config;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    use super::*;
    use crate::workspace::create_workspace;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut buf));
            let options = FileOptions::default();
            for (name, data) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    fn workspace() -> (tempfile::TempDir, WorkspaceHandle) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.workspaces_dir = dir.path().to_path_buf();
        let handle = create_workspace(&config, InputType::Zip).unwrap();
        (dir, handle)
    }

    #[tokio::test]
    async fn rejects_payloads_without_a_zip_signature() {
        let (_dir, handle) = workspace();
        let ingestor = ArchiveIngestor::new(b"not a zip".to_vec(), 100, 1024 * 1024, 10);
        let err = ingestor.materialize(&handle).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidSignature));
    }

    #[tokio::test]
    async fn extracts_a_well_formed_archive() {
        let (_dir, handle) = workspace();
        let bytes = build_zip(&[("pom.xml", b"<project/>"), ("src/main/java/Main.java", b"class Main {}")]);
        let ingestor = ArchiveIngestor::new(bytes, 100, 1024 * 1024, 10);
        ingestor.materialize(&handle).await.unwrap();

        assert!(handle.source_dir.join("pom.xml").is_file());
        assert!(handle.source_dir.join("src/main/java/Main.java").is_file());
    }

    #[tokio::test]
    async fn lifts_a_single_top_level_wrapper_directory() {
        let (_dir, handle) = workspace();
        let bytes = build_zip(&[("my-project/pom.xml", b"<project/>"), ("my-project/src/A.java", b"class A {}")]);
        let ingestor = ArchiveIngestor::new(bytes, 100, 1024 * 1024, 10);
        ingestor.materialize(&handle).await.unwrap();

        assert!(handle.source_dir.join("pom.xml").is_file());
        assert!(!handle.source_dir.join("my-project").exists());
    }

    #[tokio::test]
    async fn rejects_entries_with_dangerous_extensions() {
        let (_dir, handle) = workspace();
        let bytes = build_zip(&[("payload.exe", b"MZ")]);
        let ingestor = ArchiveIngestor::new(bytes, 100, 1024 * 1024, 10);
        let err = ingestor.materialize(&handle).await.unwrap_err();
        assert!(matches!(err, IngestError::DangerousEntry(_)));
    }

    #[tokio::test]
    async fn aborts_mid_extraction_once_uncompressed_size_is_exceeded() {
        let (_dir, handle) = workspace();
        let bytes = build_zip(&[("big.txt", &vec![b'a'; 4096])]);
        let ingestor = ArchiveIngestor::new(bytes, 100, 1024, 10);
        let err = ingestor.materialize(&handle).await.unwrap_err();
        assert!(matches!(err, IngestError::UncompressedSizeExceeded));
    }

    #[tokio::test]
    async fn rejects_archives_exceeding_the_entry_count_limit() {
        let (_dir, handle) = workspace();
        let entries: Vec<(String, Vec<u8>)> = (0..5).map(|i| (format!("f{i}.txt"), b"x".to_vec())).collect();
        let refs: Vec<(&str, &[u8])> = entries.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
        let bytes = build_zip(&refs);
        let ingestor = ArchiveIngestor::new(bytes, 3, 1024 * 1024, 10);
        let err = ingestor.materialize(&handle).await.unwrap_err();
        assert!(matches!(err, IngestError::TooManyEntries));
    }
}
