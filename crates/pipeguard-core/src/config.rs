//! Process-wide configuration (spec Section 6).
//!
//! A single immutable value built once at startup and passed explicitly
//! into every constructor downstream, rather than read from globals at
//! call sites (spec Section 9, "Design Notes").

use std::path::PathBuf;
use std::time::Duration;

use crate::types::DatabaseConfig;

pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
pub const MAX_FILES: usize = 10_000;
pub const MAX_UNCOMPRESSED_BYTES: u64 = 200 * 1024 * 1024;
pub const MAX_DEPTH: usize = 25;
pub const GIT_MAX_DEPTH: u32 = 1;

/// Daemon + admission configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory under which `job-NNN/` workspaces are created.
    pub workspaces_dir: PathBuf,
    /// Host-side path corresponding to `workspaces_dir`, bind-mounted into
    /// runner containers (spec Section 6: `HOST_WORKSPACES_PATH`).
    pub host_workspaces_path: String,
    /// Directory holding `global/` and `<framework>-<build_tool>/` stage
    /// script templates, copied by the pipeline installer.
    pub pipeline_templates_dir: PathBuf,

    pub max_upload_bytes: u64,
    pub max_files: usize,
    pub max_uncompressed_bytes: u64,
    pub max_depth: usize,

    pub git_clone_timeout: Duration,
    pub git_max_depth: u32,

    pub default_database_config: DatabaseConfig,

    /// Number of concurrent execution-plane workers (spec Section 5: "N >= 1").
    pub max_concurrent_jobs: usize,

    /// HTTP bind port for the status/reports API.
    pub http_port: u16,
    /// Optional bearer token required on every HTTP request.
    pub auth_token: Option<String>,

    /// Container runtime binary (`docker`, `podman`, ...).
    pub container_runtime_bin: String,
    /// Compose binary invocation (`docker compose`, `podman-compose`, ...).
    pub compose_bin: String,
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// the defaults named in spec Section 6.
    pub fn from_env() -> Self {
        Self {
            workspaces_dir: std::env::var("WORKSPACES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./workspaces")),
            host_workspaces_path: std::env::var("HOST_WORKSPACES_PATH")
                .unwrap_or_else(|_| "/var/lib/pipeguard/workspaces".to_string()),
            pipeline_templates_dir: std::env::var("PIPELINE_TEMPLATES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./templates/pipelines")),

            max_upload_bytes: env_u64("MAX_UPLOAD_BYTES", MAX_UPLOAD_BYTES),
            max_files: env_usize("MAX_FILES", MAX_FILES),
            max_uncompressed_bytes: env_u64("MAX_UNCOMPRESSED_BYTES", MAX_UNCOMPRESSED_BYTES),
            max_depth: env_usize("MAX_DEPTH", MAX_DEPTH),

            git_clone_timeout: Duration::from_secs(env_u64("GIT_CLONE_TIMEOUT_SECS", 60)),
            git_max_depth: env_u32("GIT_MAX_DEPTH", GIT_MAX_DEPTH),

            default_database_config: DatabaseConfig {
                image: std::env::var("DEFAULT_DB_IMAGE").unwrap_or_else(|_| "postgres:16-alpine".to_string()),
                name: std::env::var("DEFAULT_DB_NAME").unwrap_or_else(|_| "appdb".to_string()),
                user: std::env::var("DEFAULT_DB_USER").unwrap_or_else(|_| "appuser".to_string()),
                password: std::env::var("DEFAULT_DB_PASSWORD").unwrap_or_else(|_| "apppass".to_string()),
                port: env_u16("DEFAULT_DB_PORT", 5432),
                driver: std::env::var("DEFAULT_DB_DRIVER").unwrap_or_else(|_| "postgresql".to_string()),
            },

            max_concurrent_jobs: env_usize("MAX_CONCURRENT_JOBS", 3),

            http_port: env_u16("HTTP_PORT", 8080),
            auth_token: std::env::var("PIPEGUARD_AUTH_TOKEN").ok(),

            container_runtime_bin: std::env::var("CONTAINER_RUNTIME_BIN").unwrap_or_else(|_| "docker".to_string()),
            compose_bin: std::env::var("COMPOSE_BIN").unwrap_or_else(|_| "docker compose".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspaces_dir: PathBuf::from("./workspaces"),
            host_workspaces_path: "/var/lib/pipeguard/workspaces".to_string(),
            pipeline_templates_dir: PathBuf::from("./templates/pipelines"),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            max_files: MAX_FILES,
            max_uncompressed_bytes: MAX_UNCOMPRESSED_BYTES,
            max_depth: MAX_DEPTH,
            git_clone_timeout: Duration::from_secs(60),
            git_max_depth: GIT_MAX_DEPTH,
            default_database_config: DatabaseConfig {
                image: "postgres:16-alpine".to_string(),
                name: "appdb".to_string(),
                user: "appuser".to_string(),
                password: "apppass".to_string(),
                port: 5432,
                driver: "postgresql".to_string(),
            },
            max_concurrent_jobs: 3,
            http_port: 8080,
            auth_token: None,
            container_runtime_bin: "docker".to_string(),
            compose_bin: "docker compose".to_string(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
