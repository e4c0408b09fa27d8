//! pipeguardd - DevSecOps pipeline service daemon.
//!
//! Library components for the daemon process.

pub mod admission;
pub mod engine;
pub mod ingest;
pub mod installer;
pub mod orchestrator;
pub mod queue;
pub mod runtime;
pub mod server;
pub mod validate;
pub mod workspace;

use std::sync::Arc;

use pipeguard_core::{Config, JobMetadata};
use queue::{ChannelQueue, JobQueue};
use runtime::{ProcessRuntime, Runtime};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use workspace::WorkspaceHandle;

pub type AppResult<T> = eyre::Result<T>;

/// Daemon state: the configuration, the in-process job queue, the
/// container runtime capability, and the concurrency gate (spec
/// Section 5: "N >= 1 concurrent workers").
pub struct Daemon {
    config: Arc<Config>,
    queue: Arc<dyn JobQueue>,
    runtime: Arc<dyn Runtime>,
    worker_slots: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let worker_slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let runtime = Arc::new(ProcessRuntime::new(config.container_runtime_bin.clone(), config.compose_bin.clone()));
        Self {
            config: Arc::new(config),
            queue: Arc::new(ChannelQueue::new()),
            runtime,
            worker_slots,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> Arc<dyn JobQueue> {
        Arc::clone(&self.queue)
    }

    /// Run the HTTP server and the job-consuming loop until `shutdown` is
    /// called or the process receives a termination signal.
    pub async fn run(&self) -> AppResult<()> {
        info!(port = self.config.http_port, "pipeguardd starting");

        let app_state = Arc::new(server::AppState { config: (*self.config).clone(), queue: self.queue() });
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let router = server::router(app_state);
        let cancel_for_server = self.cancel.clone();
        let server_handle = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                cancel_for_server.cancelled().await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "HTTP server error");
            }
        });

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("shutdown signal received, exiting dispatch loop");
                    break;
                }
                job_id = self.queue.dequeue() => {
                    match job_id {
                        Some(job_id) => self.spawn_worker(job_id),
                        None => break,
                    }
                }
            }
        }

        let _ = server_handle.await;
        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn spawn_worker(&self, job_id: pipeguard_core::JobId) {
        let config = Arc::clone(&self.config);
        let runtime = Arc::clone(&self.runtime);
        let permit = Arc::clone(&self.worker_slots);
        tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.expect("worker semaphore never closes");
            if let Err(e) = run_one_job(&config, &runtime, &job_id).await {
                error!(job_id = %job_id, error = %e, "job execution failed");
            }
        });
    }
}

async fn run_one_job(config: &Config, runtime: &Arc<dyn Runtime>, job_id: &pipeguard_core::JobId) -> AppResult<()> {
    let job_dir = config.workspaces_dir.join(job_id.as_str());
    let metadata: JobMetadata = pipeguard_core::json::read_json(&job_dir.join("metadata.json"))?;
    let workspace = WorkspaceHandle {
        job_id: job_id.clone(),
        job_dir: job_dir.clone(),
        source_dir: job_dir.join("source"),
        input_type: metadata.input_type,
    };

    info!(job_id = %job_id, "starting job execution");
    engine::execute_job(&workspace, &metadata, config, runtime.as_ref()).await?;
    Ok(())
}
