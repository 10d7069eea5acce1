//! # HVAC Monitor
//!
//! Daemon that records HVAC stage transitions with a temperature/humidity
//! sample and uploads the log in batches.
//!
//! ## Module Organization
//! ```text
//! hvac_monitor/
//! ├── lib.rs          ◄─── You are here (startup, logging, signals)
//! ├── hardware/
//! │   ├── signal.rs   ◄─── GPIO polling, debounce, edge events
//! │   └── sensor.rs   ◄─── IIO sensor, retry, sentinel fallback
//! ├── controller.rs   ◄─── Stage machine → record log
//! ├── monitor.rs      ◄─── Task wiring and shutdown order
//! └── error.rs        ◄─── MonitorError
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Initialize logging (RUST_LOG, default info,hvac=debug,sqlx=warn)   │
//! │  2. Load MonitorConfig (file + HVAC_* env; defaults on any error)      │
//! │  3. Open database, run migrations            ── failure is fatal       │
//! │  4. Export GPIO lines, open the IIO sensor                             │
//! │  5. Run Monitor until SIGINT / SIGTERM                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod error;
pub mod hardware;
pub mod monitor;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hvac_db::{Database, DbConfig};
use hvac_sync::MonitorConfig;

pub use controller::StageController;
pub use error::{MonitorError, MonitorResult};
pub use monitor::{Hardware, Monitor};

use hardware::{IioSensor, SysfsGpio};

/// Runs the daemon against real hardware until a shutdown signal arrives.
pub async fn run(config: MonitorConfig) -> MonitorResult<()> {
    let config = Arc::new(config);

    let db = Database::new(DbConfig::new(&config.database.path)).await?;
    if db.health_check().await {
        info!(path = %config.database.path.display(), "Database ready");
    } else {
        warn!(path = %config.database.path.display(), "Database opened but not answering queries");
    }

    let gpio = SysfsGpio::new(&config.signals.gpio_root);
    for line in config.stage_map().unwrap_or_default().lines() {
        if let Err(e) = gpio.export(line.index) {
            warn!(line = line.index, error = %e, "Could not export GPIO line");
        }
    }

    let hardware = Hardware {
        signals: Box::new(gpio),
        sensor: Arc::new(IioSensor::new(&config.sensor.device)),
    };

    Monitor::new(config, db)
        .run(hardware, shutdown_signal())
        .await
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=hvac=trace` - Show trace for hvac crates only
/// - Default: `info,hvac=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hvac=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
