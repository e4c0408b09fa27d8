//! pipeguardd - DevSecOps pipeline service daemon.
//!
//! Main entry point for the daemon binary.

use pipeguard_core::Config;
use pipeguardd::Daemon;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::from_env();
    let daemon = Daemon::new(config);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().expect("failed to create tokio runtime");

    runtime.block_on(async {
        let daemon_ref = &daemon;
        tokio::select! {
            result = daemon.run() => {
                if let Err(e) = result {
                    error!("daemon error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT");
                daemon_ref.shutdown();
            }
        }
    });
}
