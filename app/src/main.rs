mod config;
mod runtime;
mod signal;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "srt-live-reflect", version)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "/etc/srt-live-reflect/config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = match config::Config::load_from_path(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, path = %args.config.display(), "failed to load config");
            return ExitCode::from(1);
        }
    };
    info!(name = %cfg.name, reflects = cfg.reflects.len(), "config loaded");

    if cfg.reflects.is_empty() {
        error!("no reflects configured, nothing to do");
        return ExitCode::from(2);
    }

    let transport = runtime::default_transport();
    let bound = runtime::bind_all(transport, cfg.reflects).await;
    if bound.is_empty() {
        error!("every configured endpoint failed to bind, exiting");
        return ExitCode::from(3);
    }

    let cancel = tokio_util::sync::CancellationToken::new();
    let mut handles = Vec::new();
    for endpoint in bound {
        handles.push(tokio::spawn(runtime::run_endpoint(endpoint, cancel.clone())));
    }

    signal::wait_for_shutdown().await;
    info!("shutdown signal received, stopping");
    cancel.cancel();

    for handle in handles {
        let _ = handle.await;
    }

    ExitCode::SUCCESS
}
