//! NextGCore UPF SBI daemon
//!
//! Serves the UPF management endpoint (`/nwdaf-oam`) and keeps the UPF's
//! NF profile registered with the NRF for the lifetime of the process.

pub mod config;
pub mod nf_management_clients;
pub mod nf_resource;
pub mod nnrf_service;
pub mod oam_handler;
pub mod sbi_server;

#[cfg(test)]
mod test_support;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use config::{parse_level, Config, UPF_DEFAULT_CONFIG_PATH};
use sbi_server::UpfSbiServer;

/// Upper bound on waiting for background tasks after stop
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// NextGCore UPF SBI - NRF registration and management endpoint
#[derive(Parser, Debug)]
#[command(name = "upf-sbid")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "5G Core UPF SBI daemon", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, default_value = UPF_DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'e', long)]
    log_level: Option<String>,

    /// Disable color output
    #[arg(short = 'm', long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Arc::new(Config::load(&args.config)?);

    init_logging(&args, &config)?;

    log::info!("NextGCore UPF SBI v{} starting...", env!("CARGO_PKG_VERSION"));
    config.print();

    let cancel = CancellationToken::new();
    setup_signal_handlers(cancel.clone())?;

    let tracker = TaskTracker::new();
    let server = UpfSbiServer::new(config.clone());

    server
        .start(&cancel, &tracker)
        .await
        .context("Failed to start UPF SBI server")?;

    log::info!("NextGCore UPF SBI ready");

    cancel.cancelled().await;

    log::info!("Shutting down...");
    server.stop().await;

    tracker.close();
    if tokio::time::timeout(TASK_DRAIN_TIMEOUT, tracker.wait())
        .await
        .is_err()
    {
        log::warn!("Background tasks still running after {TASK_DRAIN_TIMEOUT:?}");
    }

    log::info!("NextGCore UPF SBI shutdown complete");
    Ok(())
}

/// Initialize logging
fn init_logging(args: &Args, config: &Config) -> Result<()> {
    let mut builder = env_logger::Builder::new();

    let level = match &args.log_level {
        Some(level) => {
            parse_level(level).with_context(|| format!("Unknown log level '{level}'"))?
        }
        None => config.logger.level_filter(),
    };
    builder.filter_level(level);

    if config.logger.report_caller {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or(record.target()),
                record.line().unwrap_or(0),
                record.args()
            )
        });
    } else {
        builder.format_timestamp_millis();
        builder.format_target(false);
    }

    if args.no_color {
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder
        .try_init()
        .context("Failed to initialize logger")?;

    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(cancel: CancellationToken) -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        cancel.cancel();
    })
    .context("Failed to set Ctrl+C handler")?;

    Ok(())
}
