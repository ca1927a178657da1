//! Admission gate.
//!
//! ```text
//!     Client ──▶ request id ──▶ trace ──▶ admission control ──▶ upstream
//!                                              │
//!                                              └──▶ 429 Too Many Requests
//!
//!     janitor (every 2 min) ──▶ evict idle counters
//! ```

use std::path::PathBuf;

use clap::Parser;

use admission_gate::config::{load_config, GatewayConfig};
use admission_gate::lifecycle::startup;
use admission_gate::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "admission-gate")]
#[command(about = "Sliding-window admission control in front of an HTTP service", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "admission-gate starting"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
