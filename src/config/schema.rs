//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits so the same structs load from and save to
//! TOML or JSON files.

use serde::{Deserialize, Serialize};

/// Root configuration for the trading engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Instance name, shown in logs and the API.
    pub name: String,

    /// Directory for runtime data (log files, caches).
    pub data_directory: String,

    pub logging: LoggingConfig,

    pub metrics: MetricsConfig,

    /// Primary persistence layer.
    pub database: DatabaseConfig,

    /// Internet connectivity monitor.
    pub connection_monitor: ConnectionMonitorConfig,

    /// Event dispatcher worker pool.
    pub dispatch: DispatchConfig,

    pub communications: CommunicationsConfig,

    pub portfolio: PortfolioConfig,

    pub order_manager: OrderManagerConfig,

    /// HTTP API server.
    pub remote_control: RemoteControlConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "tradebot".to_string(),
            data_directory: String::new(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            database: DatabaseConfig::default(),
            connection_monitor: ConnectionMonitorConfig::default(),
            dispatch: DispatchConfig::default(),
            communications: CommunicationsConfig::default(),
            portfolio: PortfolioConfig::default(),
            order_manager: OrderManagerConfig::default(),
            remote_control: RemoteControlConfig::default(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` expression). `RUST_LOG` takes precedence.
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    pub json: bool,

    /// Write to stdout.
    pub console: bool,

    /// Log file name. Empty disables file output. Relative names are placed
    /// in `data_directory`.
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            console: true,
            file: String::new(),
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Exporter bind address (e.g., "127.0.0.1:9090").
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,

    /// Log every connection check.
    pub verbose: bool,

    /// Database driver. Only "postgres" is supported.
    pub driver: String,

    pub connection: ConnectionDetails,

    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Interval between keep-alive checks in seconds.
    pub check_interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            verbose: false,
            driver: "postgres".to_string(),
            connection: ConnectionDetails::default(),
            connect_timeout_secs: 5,
            check_interval_secs: 30,
        }
    }
}

/// Database DSN parts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionDetails {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub sslmode: String,
}

impl Default for ConnectionDetails {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: String::new(),
            password: String::new(),
            database: "tradebot".to_string(),
            sslmode: "disable".to_string(),
        }
    }
}

/// Connectivity monitor settings. Empty lists and a zero interval fall back
/// to built-in defaults at setup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionMonitorConfig {
    pub enabled: bool,

    /// DNS servers probed over TCP port 53 (IP, or IP:port).
    pub dns_list: Vec<String>,

    /// Public domains resolved as a second signal.
    pub domain_list: Vec<String>,

    /// Interval between probe rounds in milliseconds.
    pub check_interval_ms: u64,

    /// Per-target probe timeout in milliseconds.
    pub probe_timeout_ms: u64,

    /// Consecutive failed rounds before reporting offline.
    pub offline_threshold: u32,

    /// Consecutive successful rounds before reporting online again.
    pub online_threshold: u32,
}

impl Default for ConnectionMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dns_list: Vec::new(),
            domain_list: Vec::new(),
            check_interval_ms: 0,
            probe_timeout_ms: 2000,
            offline_threshold: 2,
            online_threshold: 1,
        }
    }
}

/// Event dispatcher settings. Zero values fall back to defaults at setup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub enabled: bool,

    /// Number of worker tasks.
    pub workers: usize,

    /// Jobs that may wait in the queue before `publish` fails.
    pub max_jobs: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 0,
            max_jobs: 0,
        }
    }
}

/// Communications relayer settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CommunicationsConfig {
    pub enabled: bool,

    /// Events that may be queued before `push_event` fails.
    pub buffer_size: usize,

    pub relayers: Vec<RelayerConfig>,
}

impl Default for CommunicationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 128,
            relayers: vec![RelayerConfig {
                name: "log".to_string(),
                enabled: true,
            }],
        }
    }
}

/// One relayer target.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelayerConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Portfolio settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub enabled: bool,

    /// Address book, written back on shutdown.
    pub addresses: Vec<PortfolioAddress>,

    /// Interval between portfolio summaries in seconds.
    pub summary_interval_secs: u64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addresses: Vec::new(),
            summary_interval_secs: 60,
        }
    }
}

/// A tracked wallet or exchange address.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PortfolioAddress {
    pub address: String,

    /// Currency code, e.g. "BTC".
    pub coin: String,

    #[serde(default)]
    pub balance: f64,

    #[serde(default)]
    pub description: String,
}

/// Order manager settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrderManagerConfig {
    pub enabled: bool,

    /// Interval between sweeps of finished orders in seconds.
    pub sweep_interval_secs: u64,

    /// How long finished orders are kept in seconds.
    pub retention_secs: u64,

    pub verbose: bool,
}

impl Default for OrderManagerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 60,
            retention_secs: 3600,
            verbose: false,
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteControlConfig {
    pub enabled: bool,

    /// Bind address (e.g., "127.0.0.1:9050").
    pub bind_address: String,
}

impl Default for RemoteControlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:9050".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: Config = toml::from_str("name = \"desk\"").unwrap();
        assert_eq!(config.name, "desk");
        assert_eq!(config, Config { name: "desk".into(), ..Config::default() });
    }

    #[test]
    fn test_sections_override_individual_fields() {
        let config: Config = toml::from_str(
            r#"
            [database]
            enabled = true
            [database.connection]
            host = "db.internal"

            [[portfolio.addresses]]
            address = "bc1qxyz"
            coin = "BTC"
            "#,
        )
        .unwrap();

        assert!(config.database.enabled);
        assert_eq!(config.database.connection.host, "db.internal");
        assert_eq!(config.database.connection.port, 5432);
        assert_eq!(config.portfolio.addresses.len(), 1);
        assert_eq!(config.portfolio.addresses[0].balance, 0.0);
    }

    #[test]
    fn test_relayer_enabled_defaults_to_true() {
        let config: Config =
            serde_json::from_str(r#"{"communications": {"relayers": [{"name": "slack"}]}}"#).unwrap();
        assert!(config.communications.relayers[0].enabled);
        assert_eq!(config.communications.buffer_size, 128);
    }
}
