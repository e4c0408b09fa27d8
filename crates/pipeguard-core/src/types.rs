//! Typed data model (spec Section 3).
//!
//! Replaces the untyped configuration dictionaries of the source system
//! with named structs and tagged enums, per Section 9's "Design Notes".

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `job-NNN`, a zero-padded 3-digit counter.
///
/// Generation is handled by the workspace manager (spec Section 4.2); this
/// type is just the validated, displayable identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Format a job id from a 1-based sequence number.
    pub fn from_sequence(n: u32) -> Self {
        Self(format!("job-{n:03}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How the project source was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Zip,
    Github,
}

/// Outcome of structure validation / admission (spec Section 3, 4.5, 4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    AcceptedWithIssues,
    Refused,
}

/// Declared technology stack (spec Section 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub language: String,
    pub framework: String,
    pub build_tool: String,
    #[serde(default)]
    pub requires_db: bool,
}

/// Optional pinned tool versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_tool: Option<String>,
}

/// Secret-scan execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretScanMode {
    Dir,
    Git,
    Custom,
}

/// SAST execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SastMode {
    Default,
    Custom,
}

/// Environment injected into `global/custom.sh` for a custom secret-scan
/// or SAST tool (spec Section 4.9.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomToolConfig {
    pub install_cmd: String,
    pub tool_cmd: String,
    pub log_ext: String,
}

/// Stage selection and custom-tool configuration (spec Section 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    pub run_secret_scan: bool,
    #[serde(default = "default_secret_scan_mode")]
    pub secret_scan_mode: SecretScanMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_custom: Option<CustomToolConfig>,

    #[serde(default)]
    pub run_build: bool,
    #[serde(default)]
    pub run_unit_tests: bool,

    #[serde(default)]
    pub run_sast: bool,
    #[serde(default = "default_sast_mode")]
    pub sast_mode: SastMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sast_custom: Option<CustomToolConfig>,

    #[serde(default)]
    pub run_sca: bool,
    #[serde(default)]
    pub run_package: bool,
    #[serde(default)]
    pub run_smoke: bool,
    #[serde(default)]
    pub run_dast: bool,
}

fn default_secret_scan_mode() -> SecretScanMode {
    SecretScanMode::Dir
}

fn default_sast_mode() -> SastMode {
    SastMode::Default
}

impl Pipeline {
    /// Whether `stage` was requested at admission time (spec Section 8:
    /// `S in SKIPPED iff pipeline.run_<s> was false at admission`).
    pub fn wants(&self, stage: Stage) -> bool {
        match stage {
            Stage::Secrets => self.run_secret_scan,
            Stage::Build => self.run_build,
            Stage::Test => self.run_unit_tests,
            Stage::Sast => self.run_sast,
            Stage::Sca => self.run_sca,
            Stage::Package => self.run_package,
            Stage::SmokeTest => self.run_smoke,
            Stage::Dast => self.run_dast,
        }
    }
}

/// Database container configuration, injected when `stack.requires_db`
/// (spec Section 4.9.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub image: String,
    pub name: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub driver: String,
}

/// Immutable job metadata, written once by admission (spec Section 3, 4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: JobId,
    pub status: JobStatus,
    pub stack: Stack,
    #[serde(default)]
    pub versions: Versions,
    pub pipeline: Pipeline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub input_type: InputType,
}

/// The eight ordered pipeline stages (spec Section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Secrets,
    Build,
    Test,
    Sast,
    Sca,
    Package,
    #[serde(rename = "SMOKE-TEST")]
    SmokeTest,
    Dast,
}

/// Canonical declaration order, also the dispatch order of spec Section 4.9.
pub const STAGE_ORDER: [Stage; 8] = [
    Stage::Secrets,
    Stage::Build,
    Stage::Test,
    Stage::Sast,
    Stage::Sca,
    Stage::Package,
    Stage::SmokeTest,
    Stage::Dast,
];

/// Stages whose FAILURE aborts the pipeline (spec Section 3).
pub const BLOCKING_STAGES: [Stage; 3] = [Stage::Build, Stage::Package, Stage::SmokeTest];

impl Stage {
    pub fn is_blocking(self) -> bool {
        BLOCKING_STAGES.contains(&self)
    }

    /// Lowercase slug used for `reports/<stage_lower>/` and script lookups.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Secrets => "secrets",
            Self::Build => "build",
            Self::Test => "test",
            Self::Sast => "sast",
            Self::Sca => "sca",
            Self::Package => "package",
            Self::SmokeTest => "smoke-test",
            Self::Dast => "dast",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        STAGE_ORDER.into_iter().find(|s| s.slug().eq_ignore_ascii_case(slug))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug().to_uppercase())
    }
}

/// Per-stage lifecycle status (spec Section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Pending,
    Skipped,
    Running,
    Success,
    Failure,
    Failed,
}

/// Stage view entry in `state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StageState {
    pub fn pending() -> Self {
        Self { status: StageStatus::Pending, message: None }
    }

    pub fn skipped() -> Self {
        Self { status: StageStatus::Skipped, message: None }
    }
}

/// Job-level execution lifecycle (spec Section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// `state.json`: rewritten atomically as stages progress (spec Section 3, 6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    pub updated_at: DateTime<Utc>,
    pub stages: BTreeMap<Stage, StageState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionState {
    /// Build the initial `state.json` for an admitted job (spec Section 4.9
    /// "Preparation" step 3): every requested stage PENDING, the rest SKIPPED.
    pub fn initial(pipeline: &Pipeline) -> Self {
        let stages = STAGE_ORDER
            .into_iter()
            .map(|s| {
                let state = if pipeline.wants(s) { StageState::pending() } else { StageState::skipped() };
                (s, state)
            })
            .collect();
        Self {
            state: RunState::Running,
            current_stage: None,
            updated_at: Utc::now(),
            stages,
            error: None,
        }
    }

    /// Synthesize the QUEUED-phase view from `pipeline` flags alone, used
    /// by the status API before `state.json` exists (spec Section 9, open
    /// question: "the same shape in both phases").
    pub fn synthesize_queued(pipeline: &Pipeline) -> Self {
        let mut state = Self::initial(pipeline);
        state.state = RunState::Queued;
        state
    }
}

/// Result status produced by a stage script inside the runner container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageResultStatus {
    Success,
    Failure,
}

/// `reports/<stage>/result.json` (spec Section 3). Extra fields a stage
/// script may emit are not modeled; only status/message are contractual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub status: StageResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<StageResultStatus> for StageStatus {
    fn from(value: StageResultStatus) -> Self {
        match value {
            StageResultStatus::Success => Self::Success,
            StageResultStatus::Failure => Self::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_with(wanted: &[Stage]) -> Pipeline {
        Pipeline {
            run_secret_scan: wanted.contains(&Stage::Secrets),
            secret_scan_mode: SecretScanMode::Dir,
            secret_custom: None,
            run_build: wanted.contains(&Stage::Build),
            run_unit_tests: wanted.contains(&Stage::Test),
            run_sast: wanted.contains(&Stage::Sast),
            sast_mode: SastMode::Default,
            sast_custom: None,
            run_sca: wanted.contains(&Stage::Sca),
            run_package: wanted.contains(&Stage::Package),
            run_smoke: wanted.contains(&Stage::SmokeTest),
            run_dast: wanted.contains(&Stage::Dast),
        }
    }

    #[test]
    fn job_id_formats_zero_padded() {
        assert_eq!(JobId::from_sequence(1).as_str(), "job-001");
        assert_eq!(JobId::from_sequence(42).as_str(), "job-042");
        assert_eq!(JobId::from_sequence(999).as_str(), "job-999");
    }

    #[test]
    fn initial_state_skips_exactly_the_stages_not_requested() {
        let pipeline = pipeline_with(&[Stage::Build, Stage::Package]);
        let state = ExecutionState::initial(&pipeline);

        for stage in STAGE_ORDER {
            let expected = if pipeline.wants(stage) { StageStatus::Pending } else { StageStatus::Skipped };
            assert_eq!(state.stages[&stage].status, expected, "stage {stage}");
        }
    }

    #[test]
    fn synthesized_queued_view_matches_running_view_shape() {
        let pipeline = pipeline_with(&[Stage::Secrets, Stage::Dast]);
        let queued = ExecutionState::synthesize_queued(&pipeline);
        let running = ExecutionState::initial(&pipeline);

        assert_eq!(queued.state, RunState::Queued);
        assert_eq!(queued.stages, running.stages);
        assert!(queued.current_stage.is_none());
    }

    #[test]
    fn stage_slug_round_trips_through_from_slug() {
        for stage in STAGE_ORDER {
            assert_eq!(Stage::from_slug(stage.slug()), Some(stage));
        }
        assert_eq!(Stage::from_slug("bogus"), None);
    }
}
