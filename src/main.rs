//! Adiestra server binary
//!
//! Starts the training orchestrator's HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 127.0.0.1:8000, one training worker
//! adiestra
//!
//! # Bind elsewhere and allow two concurrent training sessions
//! adiestra --host 0.0.0.0 --port 9000 --workers 2
//! ```
//!
//! Recognized environment variables: `WORKER_POOL_SIZE`, `ALLOWED_ORIGINS`,
//! `SESSION_RETENTION`, `DATABASE_URL`, and `RUST_LOG` for log filtering.

use adiestra::server::{ApiServer, ServerConfig};
use clap::Parser;
use std::net::IpAddr;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adiestra", version, about = "Training session orchestrator server")]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to bind
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Training worker parallelism (overrides WORKER_POOL_SIZE)
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::from_env().with_address((cli.host, cli.port).into());
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }

    let server = ApiServer::new(config);
    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
