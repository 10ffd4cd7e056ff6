//! Server configuration consumed by the coordination core.
//!
//! The binary crate owns file loading and CLI overrides; this is the
//! validated, typed configuration the core actually runs on.

use crucible_protocol::Role;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default gap kept between dynamic instances along the packing axis.
fn default_spacing() -> i32 {
    2048
}

/// Default queue scan interval in milliseconds.
fn default_scan_interval_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

/// Configuration for one coordination process.
///
/// A fleet runs exactly one process with [`Role::Host`]; every other process
/// is a backend identified by its `server_name`, which doubles as the origin
/// players are routed back to when a host-side flow fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// This process's role on the fleet
    pub role: Role,

    /// This server's name as known to the fleet proxy
    pub server_name: String,

    /// Address of the bus relay every process connects to
    pub bus_address: String,

    /// Logical channel name announced to the relay on connect
    pub channel: String,

    /// Minimum gap between instance regions along the packing axis
    #[serde(default = "default_spacing")]
    pub spacing: i32,

    /// How often the host scans queues for ready batches, in milliseconds
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Whether finished instances are parked for reuse instead of released
    #[serde(default = "default_true")]
    pub cache_instances: bool,

    /// Whether provisioning should try a saved schematic before falling
    /// back to a region copy
    #[serde(default)]
    pub use_schematics: bool,
}

impl ServerConfig {
    /// The scan interval as a [`Duration`].
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Validates the configuration for consistency.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is usable, or a string describing the
    /// first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.server_name.is_empty() {
            return Err("server_name cannot be empty".to_string());
        }

        if self.bus_address.is_empty() {
            return Err("bus_address cannot be empty".to_string());
        }

        if self.channel.is_empty() {
            return Err("channel cannot be empty".to_string());
        }

        if self.spacing < 0 {
            return Err(format!("spacing must be non-negative, got {}", self.spacing));
        }

        if self.scan_interval_ms == 0 {
            return Err("scan_interval_ms must be greater than zero".to_string());
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            role: Role::Backend,
            server_name: "server-1".to_string(),
            bus_address: "127.0.0.1:6650".to_string(),
            channel: "crucible:fleet".to_string(),
            spacing: default_spacing(),
            scan_interval_ms: default_scan_interval_ms(),
            cache_instances: true,
            use_schematics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.spacing, 2048);
        assert_eq!(config.scan_interval(), Duration::from_millis(2000));
    }

    #[test]
    fn validation_rejects_empty_names() {
        let mut config = ServerConfig::default();
        config.server_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_scan_interval() {
        let mut config = ServerConfig::default();
        config.scan_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_negative_spacing() {
        let mut config = ServerConfig::default();
        config.spacing = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserialization_fills_defaults() {
        let toml_like = serde_json::json!({
            "role": "host",
            "server_name": "hub",
            "bus_address": "127.0.0.1:6650",
            "channel": "crucible:fleet"
        });

        let config: ServerConfig = serde_json::from_value(toml_like).unwrap();
        assert_eq!(config.role, Role::Host);
        assert_eq!(config.spacing, 2048);
        assert_eq!(config.scan_interval_ms, 2000);
        assert!(config.cache_instances);
        assert!(!config.use_schematics);
    }
}
