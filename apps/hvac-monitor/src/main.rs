//! # HVAC Monitor Entry Point
//!
//! ```bash
//! # config.toml in the working directory (or $HVAC_CONFIG)
//! hvac-monitor
//!
//! # Explicit config file; .json is accepted for older installs
//! hvac-monitor --config /etc/hvac/config.toml
//! ```

use anyhow::Context;
use std::env;
use std::path::PathBuf;
use tracing::info;

use hvac_sync::MonitorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("HVAC stage monitor");
                println!();
                println!("Usage: hvac-monitor [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: $HVAC_CONFIG or ./config.toml)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
            }
        }
        i += 1;
    }

    hvac_monitor::init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting HVAC monitor");

    let config = MonitorConfig::load_or_default(config_path);
    let db_path = config.database.path.clone();

    hvac_monitor::run(config)
        .await
        .with_context(|| format!("HVAC monitor failed (database: {})", db_path.display()))?;

    Ok(())
}
