//! Configuration management for the Crucible coordinator.
//!
//! This module handles loading, validation, and conversion of process
//! configuration from TOML files, including the arena and map definitions
//! that seed the host's directory.

use crucible_protocol::{Bounds, Position, Role};
use crucible_server::{
    Arena, ArenaDirectory, ElementMatchup, IntRange, MapKind, MapTemplate, ServerConfig,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

fn default_spacing() -> i32 {
    2048
}

fn default_scan_interval_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fleet role and identity
    pub proxy: ProxySettings,
    /// Bus relay connection settings
    pub bus: BusSettings,
    /// Instance allocation and caching settings
    #[serde(default)]
    pub instances: InstanceSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Arena (match type) definitions
    #[serde(default)]
    pub arenas: Vec<ArenaSettings>,
    /// Map template definitions
    #[serde(default)]
    pub maps: Vec<MapSettings>,
}

/// Role and identity of this process on the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    /// "host" or "backend"
    pub role: Role,
    /// This server's name as known to the fleet proxy
    pub server_name: String,
}

/// Bus relay connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// Relay address, e.g. "127.0.0.1:6650"
    pub address: String,
    /// Logical channel shared by the whole fleet
    pub channel: String,
}

/// Instance allocation and caching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSettings {
    /// Minimum gap between instance regions along the packing axis
    #[serde(default = "default_spacing")]
    pub spacing: i32,
    /// Queue scan interval in milliseconds
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Whether finished instances are parked for reuse
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Whether provisioning tries schematics before region copies
    #[serde(default)]
    pub use_schematics: bool,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            spacing: default_spacing(),
            scan_interval_ms: default_scan_interval_ms(),
            cache: true,
            use_schematics: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// One arena definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaSettings {
    pub name: String,
    pub team_size: IntRange,
    pub team_count: IntRange,
}

/// One map template definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSettings {
    pub arena: String,
    pub name: String,
    pub kind: MapKind,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub spawn_points: Vec<Position>,
    #[serde(default)]
    pub cache: bool,
    #[serde(default)]
    pub cache_reset: bool,
    #[serde(default)]
    pub matchup: Option<ElementMatchup>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy: ProxySettings {
                role: Role::Backend,
                server_name: "server-1".to_string(),
            },
            bus: BusSettings {
                address: "127.0.0.1:6650".to_string(),
                channel: "crucible:fleet".to_string(),
            },
            instances: InstanceSettings::default(),
            logging: LoggingSettings::default(),
            arenas: vec![ArenaSettings {
                name: "skirmish".to_string(),
                team_size: IntRange::new(1, Some(4)),
                team_count: IntRange::exactly(2),
            }],
            maps: vec![MapSettings {
                arena: "skirmish".to_string(),
                name: "ravine".to_string(),
                kind: MapKind::Dynamic,
                remote: true,
                bounds: Some(Bounds::new(0, 250, 0, 128, 0, 250)),
                spawn_points: vec![
                    Position::new(10.0, 64.0, 10.0),
                    Position::new(240.0, 64.0, 240.0),
                ],
                cache: true,
                cache_reset: false,
                matchup: None,
            }],
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written
    /// at the path and the defaults are returned.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts to the core's [`ServerConfig`].
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            role: self.proxy.role,
            server_name: self.proxy.server_name.clone(),
            bus_address: self.bus.address.clone(),
            channel: self.bus.channel.clone(),
            spacing: self.instances.spacing,
            scan_interval_ms: self.instances.scan_interval_ms,
            cache_instances: self.instances.cache,
            use_schematics: self.instances.use_schematics,
        }
    }

    /// Builds the process's arena directory from the configured
    /// definitions.
    pub fn build_directory(&self) -> ArenaDirectory {
        let mut directory = ArenaDirectory::new();

        for arena in &self.arenas {
            directory.insert_arena(Arena {
                name: arena.name.clone(),
                team_size: arena.team_size,
                team_count: arena.team_count,
            });
        }

        for map in &self.maps {
            directory.insert_template(MapTemplate {
                arena: map.arena.clone(),
                name: map.name.clone(),
                kind: map.kind,
                remote: map.remote,
                bounds: map.bounds,
                spawn_points: map.spawn_points.clone(),
                cache: map.cache,
                cache_reset: map.cache_reset,
                matchup: map.matchup,
            });
        }

        directory
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        self.to_server_config().validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        for map in &self.maps {
            if !self
                .arenas
                .iter()
                .any(|a| a.name.eq_ignore_ascii_case(&map.arena))
            {
                return Err(format!(
                    "Map '{}' references undefined arena '{}'",
                    map.name, map.arena
                ));
            }

            if map.kind == MapKind::Dynamic && map.bounds.is_none() {
                return Err(format!(
                    "Dynamic map '{}' must define bounds to copy from",
                    map.name
                ));
            }
        }

        Ok(())
    }
}
