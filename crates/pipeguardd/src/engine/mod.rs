//! The stage execution engine (spec Section 4.9): the asynchronous
//! worker that provisions the runner container, dispatches stages in
//! declaration order, and enforces blocking-vs-advisory failure
//! semantics.

pub mod script;
pub mod topology;

use std::path::Path;

use pipeguard_core::{
    Config, JobMetadata, PipelineError, RunState, Stage, StageResult, StageResultStatus, StageState, StageStatus, STAGE_ORDER,
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::runtime::{ComposeSpec, ContainerHandle, ContainerSpec, Runtime};
use crate::workspace::WorkspaceHandle;
use script::{normalize_secrets_report_dir, resolve_script};
use topology::Topology;

const CONTAINER_WORKDIR: &str = "/home/runner";
const CONTAINER_WORKSPACE: &str = "/home/runner/workspace";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("pipeline aborted: blocking stage {0} failed")]
    BlockingStageFailed(Stage, Option<String>),
    #[error("container runtime error: {0}")]
    Runtime(#[from] crate::runtime::RuntimeError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PipelineError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Run every PENDING stage for `metadata` to completion, persisting
/// `state.json` at every transition, and tear down the runner container
/// (and any composed services) unconditionally before returning.
pub async fn execute_job(
    workspace: &WorkspaceHandle,
    metadata: &JobMetadata,
    config: &Config,
    runtime: &dyn Runtime,
) -> Result<()> {
    prepare_workspace(workspace)?;

    let mut state = pipeguard_core::ExecutionState::initial(&metadata.pipeline);
    persist_state(workspace, &state)?;

    let image = format!("pipeguard/{}-{}:latest", metadata.stack.framework, metadata.stack.build_tool);
    let host_workspace_path = format!("{}/{}", config.host_workspaces_path, workspace.job_id.as_str());
    let container = runtime
        .run_container(&ContainerSpec {
            job_id: workspace.job_id.as_str().to_string(),
            image,
            env: vec![
                ("APP_DIR".to_string(), format!("{CONTAINER_WORKSPACE}/source")),
                ("PIPELINES_DIR".to_string(), format!("{CONTAINER_WORKSPACE}/pipelines")),
                ("REPORTS_DIR".to_string(), format!("{CONTAINER_WORKSPACE}/reports")),
            ],
            host_workspace_path,
            container_workspace_path: CONTAINER_WORKSPACE.to_string(),
            workdir: CONTAINER_WORKDIR.to_string(),
        })
        .await?;

    let outcome = run_dispatch_loop(workspace, metadata, config, runtime, &container, &mut state).await;

    let _ = runtime.stop_container(&container).await;

    match outcome {
        Ok(()) => {
            state.state = RunState::Succeeded;
            state.current_stage = None;
            persist_state(workspace, &state)?;
            info!(job_id = %workspace.job_id, "job succeeded");
            Ok(())
        }
        Err(EngineError::BlockingStageFailed(stage, message)) => {
            state.state = RunState::Failed;
            state.current_stage = None;
            state.error = Some(message.clone().unwrap_or_else(|| format!("blocking stage {stage} failed")));
            persist_state(workspace, &state)?;
            warn!(job_id = %workspace.job_id, %stage, "job failed on blocking stage");
            Err(EngineError::BlockingStageFailed(stage, message))
        }
        Err(other) => {
            state.state = RunState::Failed;
            state.current_stage = None;
            state.error = Some(other.to_string());
            persist_state(workspace, &state)?;
            error!(job_id = %workspace.job_id, error = %other, "job failed on an infrastructure error");
            Err(other)
        }
    }
}

async fn run_dispatch_loop(
    workspace: &WorkspaceHandle,
    metadata: &JobMetadata,
    config: &Config,
    runtime: &dyn Runtime,
    container: &ContainerHandle,
    state: &mut pipeguard_core::ExecutionState,
) -> Result<()> {
    for stage in STAGE_ORDER {
        if state.stages[&stage].status != StageStatus::Pending {
            continue;
        }

        state.stages.insert(stage, StageState { status: StageStatus::Running, message: None });
        state.current_stage = Some(stage);
        state.updated_at = chrono::Utc::now();
        persist_state(workspace, state)?;

        let topology = Topology::resolve(stage, metadata.stack.requires_db);

        let result = if topology.needs_compose() {
            run_composed_stage(workspace, config, runtime, &topology, stage).await
        } else {
            match resolve_script(stage, metadata) {
                Ok(script) => run_single_container_stage(workspace, runtime, container, &script).await,
                Err(message) => {
                    warn!(job_id = %workspace.job_id, %stage, %message, "stage script could not be resolved");
                    Some(StageResult { status: StageResultStatus::Failure, message: Some(message) })
                }
            }
        };

        if stage == Stage::Secrets {
            let _ = normalize_secrets_report_dir(&workspace.reports_dir());
        }

        let result = result.unwrap_or_else(|| result_or_missing(workspace, stage));
        let blocking_failure = result.status == StageResultStatus::Failure && stage.is_blocking();
        let message = result.message.clone();

        state.stages.insert(stage, StageState { status: result.status.into(), message: result.message });
        state.updated_at = chrono::Utc::now();
        persist_state(workspace, state)?;

        if blocking_failure {
            return Err(EngineError::BlockingStageFailed(stage, message));
        }
    }
    Ok(())
}

async fn run_single_container_stage(
    workspace: &WorkspaceHandle,
    runtime: &dyn Runtime,
    container: &ContainerHandle,
    script: &script::ResolvedScript,
) -> Option<StageResult> {
    let app_dir = format!("{CONTAINER_WORKSPACE}/source");
    let script_path = format!("{CONTAINER_WORKSPACE}/pipelines/{}", script.relative_path);
    if let Err(e) = runtime.exec_script(container, &app_dir, &script_path, &script.extra_env).await {
        warn!(job_id = %workspace.job_id, error = %e, "stage script execution failed");
    }
    None
}

async fn run_composed_stage(
    workspace: &WorkspaceHandle,
    config: &Config,
    runtime: &dyn Runtime,
    topology: &Topology,
    stage: Stage,
) -> Option<StageResult> {
    let fragments = topology.fragment_files();
    let project_dir = workspace.job_dir.join("pipelines").join("compose");
    if let Err(e) = copy_compose_fragments(&config.pipeline_templates_dir, &project_dir, &fragments) {
        warn!(job_id = %workspace.job_id, error = %e, "failed to stage compose fragments");
        return Some(StageResult {
            status: StageResultStatus::Failure,
            message: Some(format!("compose fragments unavailable: {e}")),
        });
    }

    let mut env = std::collections::HashMap::new();
    if topology.db {
        let db = &config.default_database_config;
        env.insert("DB_IMAGE".to_string(), db.image.clone());
        env.insert("DB_NAME".to_string(), db.name.clone());
        env.insert("DB_USER".to_string(), db.user.clone());
        env.insert("DB_PASSWORD".to_string(), db.password.clone());
        env.insert("DB_PORT".to_string(), db.port.to_string());
        env.insert("DB_DRIVER".to_string(), db.driver.clone());
    }

    let spec = ComposeSpec {
        job_id: workspace.job_id.as_str().to_string(),
        project_dir,
        fragment_files: fragments,
        exit_from: topology.exit_from().to_string(),
        env,
    };

    let up_result = runtime.compose_up(&spec).await;
    let _ = runtime.compose_down(&spec).await;

    match up_result {
        Ok(()) => None,
        Err(e) => {
            warn!(job_id = %workspace.job_id, %stage, error = %e, "compose topology failed");
            Some(StageResult { status: StageResultStatus::Failure, message: Some(e.to_string()) })
        }
    }
}

fn copy_compose_fragments(templates_dir: &Path, project_dir: &Path, fragments: &[String]) -> std::io::Result<()> {
    std::fs::create_dir_all(project_dir)?;
    let source_dir = templates_dir.join("compose");
    for fragment in fragments {
        let from = source_dir.join(fragment);
        if !from.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("compose fragment missing: {}", from.display()),
            ));
        }
        std::fs::copy(&from, project_dir.join(fragment))?;
    }
    Ok(())
}

/// If a stage ran but produced no `result.json`, it counts as a
/// synthesized FAILURE (spec Section 4.9: "Missing file => runtime
/// error; the stage counts as FAILURE with a synthesized message").
fn result_or_missing(workspace: &WorkspaceHandle, stage: Stage) -> StageResult {
    let path = workspace.reports_dir().join(stage.slug()).join("result.json");
    match pipeguard_core::json::read_json::<StageResult>(&path) {
        Ok(result) => result,
        Err(_) => StageResult {
            status: StageResultStatus::Failure,
            message: Some(format!("missing or unreadable result.json for stage {stage}")),
        },
    }
}

fn persist_state(workspace: &WorkspaceHandle, state: &pipeguard_core::ExecutionState) -> Result<()> {
    pipeguard_core::json::write_atomic(&workspace.state_path(), state)?;
    Ok(())
}

/// Preparation step (spec Section 4.9): ensure `reports/` exists, relax
/// permissions so the runner's unprivileged fixed UID can read/write
/// everything, and make stage scripts executable.
fn prepare_workspace(workspace: &WorkspaceHandle) -> std::io::Result<()> {
    std::fs::create_dir_all(workspace.reports_dir())?;
    relax_permissions_recursive(&workspace.job_dir)?;
    make_scripts_executable(&workspace.pipelines_dir())
}

fn relax_permissions_recursive(dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if path.is_dir() { 0o777 } else { 0o666 };
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))?;
        }
        if path.is_dir() {
            relax_permissions_recursive(&path)?;
        }
    }
    Ok(())
}

fn make_scripts_executable(pipelines_dir: &Path) -> std::io::Result<()> {
    if !pipelines_dir.is_dir() {
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(pipelines_dir) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "sh") {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(0o777))?;
            }
        }
    }
    Ok(())
}
