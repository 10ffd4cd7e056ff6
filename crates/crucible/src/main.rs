//! Main application entry point for the Crucible coordinator.
//!
//! Provides the CLI interface, configuration loading, and process startup:
//! one bus connection, one coordinator task, and a graceful shutdown path
//! that flushes instance pools before exiting.

use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crucible_server::{
    Connector, Coordinator, CoordinatorHandle, LoggingDriver, MessageSink, NullProvisioner,
};

mod config;
mod signals;

use config::AppConfig;

// ============================================================================
// CLI Interface
// ============================================================================

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the bus relay address
    pub bus_address: Option<String>,
    /// Optional override for this server's fleet name
    pub server_name: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    pub fn parse() -> Self {
        let matches = Command::new("Crucible Coordinator")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Fleet-wide match coordination over a shared message bus")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("crucible.toml"),
            )
            .arg(
                Arg::new("bus")
                    .short('b')
                    .long("bus")
                    .value_name("ADDRESS")
                    .help("Bus relay address (e.g., 127.0.0.1:6650)"),
            )
            .arg(
                Arg::new("name")
                    .short('n')
                    .long("name")
                    .value_name("NAME")
                    .help("This server's name on the fleet"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("config has a default value"),
            ),
            bus_address: matches.get_one::<String>("bus").cloned(),
            server_name: matches.get_one::<String>("name").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

/// Initializes the tracing subscriber from configuration.
fn setup_logging(level: &str, json_format: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json_format {
        registry
            .with(fmt::layer().json().with_thread_names(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_thread_names(true))
            .init();
    }

    Ok(())
}

// ============================================================================
// Application
// ============================================================================

/// The running process: configuration, bus connection, coordinator task.
pub struct Application {
    config: AppConfig,
    connector: Arc<Connector>,
    handle: CoordinatorHandle,
    coordinator_task: tokio::task::JoinHandle<()>,
}

impl Application {
    /// Loads configuration, connects to the bus, and starts the
    /// coordinator task.
    pub async fn start(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(bus_address) = args.bus_address {
            config.bus.address = bus_address;
        }
        if let Some(server_name) = args.server_name {
            config.proxy.server_name = server_name;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }

        setup_logging(&config.logging.level, config.logging.json_format)?;

        info!("🔥 Crucible Coordinator v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "📋 Role: {} | Server: {} | Bus: {} ('{}')",
            config.proxy.role, config.proxy.server_name, config.bus.address, config.bus.channel
        );
        info!(
            "🗺️ Directory: {} arenas, {} maps",
            config.arenas.len(),
            config.maps.len()
        );

        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let connector = Arc::new(
            Connector::connect(&config.bus.address, &config.bus.channel, inbound_tx).await?,
        );

        let (coordinator, handle) = Coordinator::new(
            config.to_server_config(),
            config.build_directory(),
            Arc::clone(&connector) as Arc<dyn MessageSink>,
            Arc::new(LoggingDriver),
            Arc::new(NullProvisioner),
        );
        handle.attach_bus(inbound_rx);

        let coordinator_task = tokio::spawn(coordinator.run());

        Ok(Self {
            config,
            connector,
            handle,
            coordinator_task,
        })
    }

    /// Runs until a shutdown signal arrives, then winds down cleanly.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("✅ Crucible coordinator is running");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        signals::wait_for_shutdown().await?;

        info!("Shutdown signal received, stopping coordinator...");
        self.handle.shutdown().await;

        match tokio::time::timeout(Duration::from_secs(5), self.coordinator_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Coordinator task ended abnormally: {e}"),
            Err(_) => warn!("Coordinator did not stop within 5s, abandoning it"),
        }

        self.connector.shutdown();

        info!(
            "👋 Crucible coordinator for '{}' stopped",
            self.config.proxy.server_name
        );
        Ok(())
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    match Application::start(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {e:?}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start coordinator: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_args_carry_overrides() {
        let args = CliArgs {
            config_path: PathBuf::from("test.toml"),
            bus_address: Some("127.0.0.1:9000".to_string()),
            server_name: Some("lobby-9".to_string()),
            log_level: Some("debug".to_string()),
            json_logs: true,
        };

        assert_eq!(args.config_path, PathBuf::from("test.toml"));
        assert_eq!(args.bus_address.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(args.server_name.as_deref(), Some("lobby-9"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }
}
