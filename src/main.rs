//! tradebot: trading engine supervisor.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──▶ Engine::new ──▶ start ─────────────────────────────┐
//!                                    │                                 │
//!                                    ▼                                 │
//!   ┌──────────┐  ┌──────────┐  ┌──────────────────┐  ┌──────────────┐ │
//!   │ database │─▶│ dispatch │─▶│ internet_monitor │─▶│communications│ │
//!   └──────────┘  └──────────┘  └──────────────────┘  └──────┬───────┘ │
//!                                                            ▼         │
//!                 ┌────────────┐  ┌───────────────┐  ┌───────────┐     │
//!                 │ api_server │◀─│ order_manager │◀─│ portfolio │     │
//!                 │(background)│  └───────────────┘  └───────────┘     │
//!                 └────────────┘                                       │
//!                                                                      │
//!   SIGINT/SIGTERM ──▶ stop: capture → stop (reverse) → save → drain ◀─┘
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use tradebot_engine::engine::{Engine, Settings};
use tradebot_engine::lifecycle::signals::wait_for_shutdown_signal;
use tradebot_engine::observability::{logging, metrics};
use tradebot_engine::{communications, connectivity, database, dispatch, http, orders, portfolio};

#[derive(Parser, Debug)]
#[command(name = "tradebot", version, about = "Trading engine supervisor", long_about = None)]
struct Cli {
    /// Configuration file (default: config.toml or config.json in the
    /// working directory, then beside the executable)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Alternate data directory; implies --dry-run
    #[arg(long)]
    datadir: Option<PathBuf>,

    /// Do not save the configuration on shutdown
    #[arg(long)]
    dry_run: bool,

    /// Verbose subsystem output
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, value_name = "BOOL")]
    database: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    dispatch: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    connection_monitor: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    communications: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    portfolio: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    order_manager: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    remote_control: Option<bool>,

    /// Bound on each subsystem's stop, 0 for none
    #[arg(long, default_value_t = 30)]
    stop_timeout_secs: u64,

    /// Bound on waiting for background work at shutdown
    #[arg(long)]
    drain_timeout_secs: Option<u64>,
}

impl Cli {
    fn into_settings(self) -> Settings {
        let mut settings = Settings {
            config_path: self.config,
            data_dir: self.datadir,
            dry_run: self.dry_run,
            verbose: self.verbose,
            stop_timeout: (self.stop_timeout_secs > 0).then(|| Duration::from_secs(self.stop_timeout_secs)),
            drain_timeout: self.drain_timeout_secs.map(Duration::from_secs),
            ..Settings::default()
        };

        let overrides = [
            (database::NAME, self.database),
            (dispatch::NAME, self.dispatch),
            (connectivity::NAME, self.connection_monitor),
            (communications::NAME, self.communications),
            (portfolio::NAME, self.portfolio),
            (orders::NAME, self.order_manager),
            (http::NAME, self.remote_control),
        ];
        for (name, value) in overrides {
            if let Some(value) = value {
                settings.flags.set(name, value);
            }
        }
        settings
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Cli::parse().into_settings();

    let engine = match Engine::new(settings) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("tradebot: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = engine.settings().apply(&engine.config());
    match logging::init(&config.logging, Path::new(&config.data_directory)) {
        Ok(guard) => engine.attach_log_guard(guard),
        Err(e) => {
            eprintln!("tradebot: failed to initialise logging: {e}");
            return ExitCode::FAILURE;
        }
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tradebot starting");

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    if let Err(e) = engine.start().await {
        tracing::error!(error = %e, "Engine failed to start");
        return ExitCode::FAILURE;
    }

    if let Err(e) = wait_for_shutdown_signal().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signals");
    }

    engine.stop().await;
    ExitCode::SUCCESS
}
