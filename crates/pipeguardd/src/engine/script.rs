//! Stage script resolution (spec Section 4.9.2).

use pipeguard_core::{JobMetadata, SastMode, SecretScanMode, Stage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    /// Path relative to the workspace's `pipelines/` directory.
    pub relative_path: String,
    /// Extra environment injected for `global/custom.sh` invocations.
    pub extra_env: Vec<(String, String)>,
}

impl ResolvedScript {
    fn plain(relative_path: impl Into<String>) -> Self {
        Self { relative_path: relative_path.into(), extra_env: Vec::new() }
    }
}

/// Resolve which script implements `stage` for this job (spec Section
/// 4.9.2). Unsupported stacks are caught earlier, at installation.
///
/// `Err` carries a human-readable reason and means the stage cannot run
/// at all; the caller synthesizes a failed `StageResult` from it rather
/// than dispatching into a runtime.
pub fn resolve_script(stage: Stage, metadata: &JobMetadata) -> Result<ResolvedScript, String> {
    match stage {
        Stage::Secrets => match metadata.pipeline.secret_scan_mode {
            SecretScanMode::Dir => Ok(ResolvedScript::plain("global/secrets-dir.sh")),
            SecretScanMode::Git => Ok(ResolvedScript::plain("global/secrets-git.sh")),
            SecretScanMode::Custom => custom_script("SECRETS", metadata.pipeline.secret_custom.as_ref()),
        },
        Stage::Sast if metadata.pipeline.sast_mode == SastMode::Custom => {
            custom_script("SAST", metadata.pipeline.sast_custom.as_ref())
        }
        _ => Ok(ResolvedScript::plain(format!(
            "{}-{}/{}.sh",
            metadata.stack.framework,
            metadata.stack.build_tool,
            stage.slug()
        ))),
    }
}

fn custom_script(stage_name: &str, config: Option<&pipeguard_core::CustomToolConfig>) -> Result<ResolvedScript, String> {
    let Some(config) = config else {
        return Err(format!("{stage_name} is set to CUSTOM mode but no custom tool configuration was provided"));
    };
    Ok(ResolvedScript {
        relative_path: "global/custom.sh".to_string(),
        extra_env: vec![
            ("STAGE".to_string(), stage_name.to_string()),
            ("INSTALL_CMD".to_string(), config.install_cmd.clone()),
            ("TOOL_CMD".to_string(), config.tool_cmd.clone()),
            ("LOG_EXT".to_string(), config.log_ext.clone()),
        ],
    })
}

/// The secrets stage may emit into `reports/secrets-dir/` or
/// `reports/secrets-git/`; normalize to `reports/secrets/` before
/// reading `result.json`. If both exist, `secrets-dir` takes precedence
/// (spec Section 9, open question).
pub fn normalize_secrets_report_dir(reports_dir: &std::path::Path) -> std::io::Result<()> {
    let target = reports_dir.join("secrets");
    let candidates = [reports_dir.join("secrets-dir"), reports_dir.join("secrets-git")];
    for candidate in candidates {
        if candidate.is_dir() {
            if target.exists() {
                std::fs::remove_dir_all(&target)?;
            }
            std::fs::rename(&candidate, &target)?;
            for other in candidates {
                if other != candidate && other.is_dir() {
                    std::fs::remove_dir_all(&other)?;
                }
            }
            return Ok(());
        }
    }
    Ok(())
}
