//! Pipeline installer (spec Section 4.7): copies `global/` and
//! `<framework>-<build_tool>/` stage scripts into the workspace.

use std::path::Path;

use pipeguard_core::Stack;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("pipeline template directory missing: {0}")]
    MissingSource(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InstallError>;

/// Copy `global/` and `<framework>-<build_tool>/` from
/// `pipeline_templates_dir` into `workspace_pipelines_dir`. Existing
/// destinations are replaced; a missing source directory is fatal
/// (spec Section 4.7: "indicates unsupported stack").
pub fn install(pipeline_templates_dir: &Path, workspace_pipelines_dir: &Path, stack: &Stack) -> Result<()> {
    copy_template_dir(pipeline_templates_dir, workspace_pipelines_dir, "global")?;
    let stack_dir = format!("{}-{}", stack.framework, stack.build_tool);
    copy_template_dir(pipeline_templates_dir, workspace_pipelines_dir, &stack_dir)?;
    info!(stack = %stack_dir, "pipeline templates installed");
    Ok(())
}

fn copy_template_dir(templates_root: &Path, workspace_pipelines_dir: &Path, name: &str) -> Result<()> {
    let source = templates_root.join(name);
    if !source.is_dir() {
        return Err(InstallError::MissingSource(source.display().to_string()));
    }
    let dest = workspace_pipelines_dir.join(name);
    if dest.exists() {
        std::fs::remove_dir_all(&dest)?;
    }
    copy_dir_recursive(&source, &dest)
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
