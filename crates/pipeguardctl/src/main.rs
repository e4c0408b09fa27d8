//! pipeguardctl - CLI client for pipeguardd.
//!
//! Local control plane client for the pipeline service daemon.

mod client;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use client::{Client, ClientError};
use pipeguard_core::{Pipeline, Stack, Versions};
use serde::Deserialize;

/// CLI client for the pipeguardd DevSecOps pipeline service.
#[derive(Parser)]
#[command(name = "pipeguardctl")]
#[command(about = "Control plane for the pipeguardd pipeline service")]
#[command(version)]
struct Cli {
    /// Daemon address.
    #[arg(long, global = true, env = "PIPEGUARD_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Auth token for the daemon API.
    #[arg(long, global = true, env = "PIPEGUARD_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a new job.
    Submit {
        #[command(subcommand)]
        source: SubmitSource,
    },
    /// Show a job's current status.
    Status {
        job_id: String,
    },
    /// Download a job's reports as a zip archive.
    Reports {
        job_id: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Fetch the log file for a single stage.
    Logs {
        job_id: String,
        stage: String,
    },
}

#[derive(Subcommand)]
enum SubmitSource {
    /// Submit an uploaded project archive.
    Zip {
        path: PathBuf,
        /// Path to a JSON file (or inline JSON) describing `stack`/`versions`/`pipeline`.
        #[arg(long)]
        metadata: String,
    },
    /// Submit a GitHub repository URL.
    Github {
        url: String,
        #[arg(long)]
        metadata: String,
    },
}

#[derive(Debug, Deserialize)]
struct SubmissionMetadata {
    stack: Stack,
    #[serde(default)]
    versions: Versions,
    pipeline: Pipeline,
}

fn load_metadata(arg: &str) -> eyre::Result<SubmissionMetadata> {
    let raw = if PathBuf::from(arg).is_file() { std::fs::read_to_string(arg)? } else { arg.to_string() };
    Ok(serde_json::from_str(&raw)?)
}

fn report(err: ClientError) -> ! {
    eprintln!("error: {err}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let client = Client::new(&cli.addr, cli.token.as_deref())?;

    match cli.command {
        Command::Submit { source } => match source {
            SubmitSource::Zip { path, metadata } => {
                let meta = load_metadata(&metadata)?;
                let job = client
                    .submit_zip(&path, meta.stack, meta.versions, meta.pipeline)
                    .await
                    .unwrap_or_else(|e| report(e));
                println!("{}", serde_json::to_string_pretty(&job)?);
            }
            SubmitSource::Github { url, metadata } => {
                let meta = load_metadata(&metadata)?;
                let job = client
                    .submit_github(url, meta.stack, meta.versions, meta.pipeline)
                    .await
                    .unwrap_or_else(|e| report(e));
                println!("{}", serde_json::to_string_pretty(&job)?);
            }
        },
        Command::Status { job_id } => {
            let status = client.status(&job_id).await.unwrap_or_else(|e| report(e));
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Reports { job_id, out } => {
            let bytes = client.reports(&job_id).await.unwrap_or_else(|e| report(e));
            std::fs::write(&out, bytes)?;
            println!("wrote {}", out.display());
        }
        Command::Logs { job_id, stage } => {
            let bytes = client.logs(&job_id, &stage).await.unwrap_or_else(|e| report(e));
            std::io::Write::write_all(&mut std::io::stdout(), &bytes)?;
        }
    }

    Ok(())
}
