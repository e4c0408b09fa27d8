//! The `Runtime` capability: the trait boundary between the stage
//! execution engine and actual container/subprocess control (spec
//! Section 9, "Design Notes" — "wrap as a Runtime capability exposing
//! run, exec, up/down; tests supply a recording fake").
//!
//! `ProcessRuntime` shells out to the configured container runtime and
//! compose binaries (spec Section 6, "Subprocess contracts").
//! `RecordingRuntime` is the test fake: it records every call and lets a
//! test script canned `result.json` content instead of driving Docker.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("io error invoking runtime: {0}")]
    Io(#[from] std::io::Error),
    #[error("container runtime exited with failure: {0}")]
    CommandFailed(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Handle to a running container, opaque to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
}

/// Parameters for starting the long-lived runner container for a job
/// (spec Section 6: `run -d -u 10001:10001 -e ... -v ... -w /home/runner
/// IMAGE tail -f /dev/null`).
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub job_id: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    pub host_workspace_path: String,
    pub container_workspace_path: String,
    pub workdir: String,
}

/// Parameters for a docker-compose based topology (spec Section 4.9.1).
#[derive(Debug, Clone)]
pub struct ComposeSpec {
    pub job_id: String,
    pub project_dir: PathBuf,
    pub fragment_files: Vec<String>,
    pub exit_from: String,
    pub env: HashMap<String, String>,
}

/// Capability boundary for container/subprocess control.
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle>;
    async fn exec_script(&self, container: &ContainerHandle, app_dir: &str, script: &str, env: &[(String, String)]) -> Result<()>;
    async fn stop_container(&self, container: &ContainerHandle) -> Result<()>;
    async fn compose_up(&self, spec: &ComposeSpec) -> Result<()>;
    async fn compose_down(&self, spec: &ComposeSpec) -> Result<()>;
}

/// Real implementation shelling out to the configured container runtime.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    pub container_runtime_bin: String,
    pub compose_bin: String,
}

impl ProcessRuntime {
    pub fn new(container_runtime_bin: impl Into<String>, compose_bin: impl Into<String>) -> Self {
        Self { container_runtime_bin: container_runtime_bin.into(), compose_bin: compose_bin.into() }
    }

    async fn run(&self, program_and_args: &[&str], cwd: Option<&Path>) -> Result<()> {
        let (program, args) = program_and_args.split_first().expect("non-empty command");
        let mut cmd = Command::new(program);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!(program, args = ?args, "invoking runtime subprocess");
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed(format!(
                "{program} {args:?} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Runtime for ProcessRuntime {
    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let container_name = format!("pipeguard-{}", spec.job_id);
        let mount = format!("{}:{}", spec.host_workspace_path, spec.container_workspace_path);

        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            container_name.clone(),
            "-u".into(),
            "10001:10001".into(),
        ];
        for (key, value) in &spec.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push("-v".into());
        args.push(mount);
        args.push("-w".into());
        args.push(spec.workdir.clone());
        args.push(spec.image.clone());
        args.push("tail".into());
        args.push("-f".into());
        args.push("/dev/null".into());

        let mut cmd = Command::new(&self.container_runtime_bin);
        cmd.args(&args).stdout(Stdio::piped()).stderr(Stdio::piped());
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed(format!(
                "container run failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(ContainerHandle { id: if id.is_empty() { container_name } else { id } })
    }

    async fn exec_script(&self, container: &ContainerHandle, app_dir: &str, script: &str, env: &[(String, String)]) -> Result<()> {
        let shell_cmd = format!("cd {app_dir} && bash {script}");
        let mut args: Vec<String> = vec!["exec".into()];
        for (key, value) in env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push(container.id.clone());
        args.push("bash".into());
        args.push("-lc".into());
        args.push(shell_cmd);

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut full: Vec<&str> = vec![&self.container_runtime_bin];
        full.extend(arg_refs);
        self.run(&full, None).await
    }

    async fn stop_container(&self, container: &ContainerHandle) -> Result<()> {
        let _ = self.run(&[&self.container_runtime_bin, "stop", &container.id], None).await;
        self.run(&[&self.container_runtime_bin, "rm", "-f", &container.id], None).await
    }

    async fn compose_up(&self, spec: &ComposeSpec) -> Result<()> {
        let mut args: Vec<String> = Vec::new();
        for fragment in &spec.fragment_files {
            args.push("-f".into());
            args.push(fragment.clone());
        }
        args.push("up".into());
        args.push("--abort-on-container-exit".into());
        args.push(format!("--exit-code-from={}", spec.exit_from));

        let mut compose_parts = self.compose_bin.split_whitespace();
        let program = compose_parts.next().unwrap_or("docker");
        let mut cmd = Command::new(program);
        cmd.args(compose_parts)
            .args(&args)
            .current_dir(&spec.project_dir)
            .envs(&spec.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed(format!(
                "compose up failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    async fn compose_down(&self, spec: &ComposeSpec) -> Result<()> {
        let mut args: Vec<String> = Vec::new();
        for fragment in &spec.fragment_files {
            args.push("-f".into());
            args.push(fragment.clone());
        }
        args.push("down".into());
        args.push("-v".into());
        args.push("--remove-orphans".into());

        let mut compose_parts = self.compose_bin.split_whitespace();
        let program = compose_parts.next().unwrap_or("docker");
        let mut cmd = Command::new(program);
        cmd.args(compose_parts)
            .args(&args)
            .current_dir(&spec.project_dir)
            .envs(&spec.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let output = cmd.output().await?;
        if !output.status.success() {
            warn!(job_id = %spec.job_id, stderr = %String::from_utf8_lossy(&output.stderr), "compose down reported failure");
        }
        Ok(())
    }
}

/// A recorded call, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    RunContainer { job_id: String, image: String },
    ExecScript { container_id: String, script: String },
    StopContainer { container_id: String },
    ComposeUp { job_id: String, fragments: Vec<String> },
    ComposeDown { job_id: String, fragments: Vec<String> },
}

/// Test fake: records every call and optionally writes canned
/// `reports/<stage>/result.json` files so the engine's dispatch loop can
/// be exercised without a container runtime (spec Section 9, "tests
/// supply a recording fake that inspects argv and emits canned result.json
/// files").
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    pub calls: Mutex<Vec<RecordedCall>>,
    /// If set, `exec_script` fails for container ids in this set.
    pub fail_exec_for: Mutex<Vec<String>>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Runtime for RecordingRuntime {
    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        self.calls.lock().unwrap().push(RecordedCall::RunContainer {
            job_id: spec.job_id.clone(),
            image: spec.image.clone(),
        });
        Ok(ContainerHandle { id: format!("fake-{}", spec.job_id) })
    }

    async fn exec_script(
        &self,
        container: &ContainerHandle,
        _app_dir: &str,
        script: &str,
        _env: &[(String, String)],
    ) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall::ExecScript {
            container_id: container.id.clone(),
            script: script.to_string(),
        });
        if self.fail_exec_for.lock().unwrap().contains(&container.id) {
            return Err(RuntimeError::CommandFailed(format!("exec failed for {}", container.id)));
        }
        Ok(())
    }

    async fn stop_container(&self, container: &ContainerHandle) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall::StopContainer { container_id: container.id.clone() });
        Ok(())
    }

    async fn compose_up(&self, spec: &ComposeSpec) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall::ComposeUp {
            job_id: spec.job_id.clone(),
            fragments: spec.fragment_files.clone(),
        });
        Ok(())
    }

    async fn compose_down(&self, spec: &ComposeSpec) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall::ComposeDown {
            job_id: spec.job_id.clone(),
            fragments: spec.fragment_files.clone(),
        });
        Ok(())
    }
}
