//! Configuration of the application kernel and the network coupling.
//!
//! Configuration can be loaded from YAML or JSON, or assembled with
//! [`SimulationConfigBuilder`].
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   start_time: 0
//!   end_time: 3600000000000      # ns
//!   log_level: info
//!
//! kernel:
//!   message_cache_time: 30000000000
//!   event_scheduler_threads: 4
//!   collect_stats: true
//!
//! coupling:
//!   host: localhost
//!   port: 5011
//!   capabilities:
//!     routing_types: [AdHocTopocast, AdHocGeocast]
//!     address_types: [Broadcast, Unicast]
//!     protocols: [Udp]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::types::{SimTime, HOUR, SECOND};
use crate::v2x::{AddressType, Destination, DestinationType, ProtocolType};

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Simulated interval and logging.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// First simulated instant in ns
    #[serde(default)]
    pub start_time: SimTime,

    /// Last simulated instant in ns; all units are torn down at this time
    pub end_time: SimTime,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            start_time: 0,
            end_time: HOUR,
            log_level: default_log_level(),
        }
    }
}

/// Application kernel parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Retention window of the V2X message cache in ns; 0 keeps messages forever
    #[serde(default = "default_message_cache_time")]
    pub message_cache_time: SimTime,

    /// Worker threads used to dispatch events of the same time and niceness
    #[serde(default = "default_event_scheduler_threads")]
    pub event_scheduler_threads: usize,

    /// Whether to collect kernel statistics
    #[serde(default = "default_collect_stats")]
    pub collect_stats: bool,
}

fn default_message_cache_time() -> SimTime {
    30 * SECOND
}

fn default_event_scheduler_threads() -> usize {
    1
}

fn default_collect_stats() -> bool {
    true
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            message_cache_time: default_message_cache_time(),
            event_scheduler_threads: default_event_scheduler_threads(),
            collect_stats: default_collect_stats(),
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.event_scheduler_threads == 0 {
            return Err(ConfigError::Validation(
                "kernel.event_scheduler_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Message types the paired network federate can simulate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkCapabilities {
    #[serde(default = "default_routing_types")]
    pub routing_types: Vec<DestinationType>,

    #[serde(default = "default_address_types")]
    pub address_types: Vec<AddressType>,

    #[serde(default = "default_protocols")]
    pub protocols: Vec<ProtocolType>,
}

fn default_routing_types() -> Vec<DestinationType> {
    vec![DestinationType::AdHocTopocast, DestinationType::AdHocGeocast]
}

fn default_address_types() -> Vec<AddressType> {
    vec![AddressType::Broadcast, AddressType::Unicast]
}

fn default_protocols() -> Vec<ProtocolType> {
    vec![ProtocolType::Udp]
}

impl Default for NetworkCapabilities {
    fn default() -> Self {
        Self {
            routing_types: default_routing_types(),
            address_types: default_address_types(),
            protocols: default_protocols(),
        }
    }
}

impl NetworkCapabilities {
    /// Returns true if a message to `destination` can be simulated.
    pub fn supports(&self, destination: &Destination) -> bool {
        self.routing_types.contains(&destination.destination_type)
            && self.address_types.contains(&destination.address_type())
            && self.protocols.contains(&destination.protocol)
    }
}

/// Connection to the paired network federate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouplingConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the network federate listens on for the command channel
    pub port: u16,

    #[serde(default)]
    pub capabilities: NetworkCapabilities,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl CouplingConfig {
    pub fn new(port: u16) -> Self {
        Self {
            host: default_host(),
            port,
            capabilities: NetworkCapabilities::default(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::Validation("coupling.host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation("coupling.port must not be 0".to_string()));
        }
        if self.capabilities.routing_types.is_empty() {
            tracing::warn!("coupling.capabilities.routing_types is empty, no V2X message will be sent");
        }
        Ok(())
    }
}

/// Complete configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub simulation: SimulationParams,

    #[serde(default)]
    pub kernel: KernelConfig,

    #[serde(default)]
    pub coupling: Option<CouplingConfig>,
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimulationConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, picking the format from its extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.simulation.end_time <= self.simulation.start_time {
            return Err(ConfigError::Validation(format!(
                "simulation.end_time ({}) must be after simulation.start_time ({})",
                self.simulation.end_time, self.simulation.start_time
            )));
        }
        self.kernel.validate()?;
        if let Some(coupling) = &self.coupling {
            coupling.validate()?;
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Builder for creating a [`SimulationConfig`] programmatically.
#[derive(Default)]
pub struct SimulationConfigBuilder {
    config: SimulationConfig,
}

impl SimulationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_time(mut self, time: SimTime) -> Self {
        self.config.simulation.start_time = time;
        self
    }

    pub fn end_time(mut self, time: SimTime) -> Self {
        self.config.simulation.end_time = time;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    pub fn message_cache_time(mut self, time: SimTime) -> Self {
        self.config.kernel.message_cache_time = time;
        self
    }

    pub fn event_scheduler_threads(mut self, threads: usize) -> Self {
        self.config.kernel.event_scheduler_threads = threads;
        self
    }

    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.kernel.collect_stats = enable;
        self
    }

    /// Couples the simulation to a network federate listening on `host:port`.
    pub fn coupling(mut self, host: impl Into<String>, port: u16) -> Self {
        let mut coupling = CouplingConfig::new(port);
        coupling.host = host.into();
        self.config.coupling = Some(coupling);
        self
    }

    /// Sets the network capabilities; requires [`coupling`](Self::coupling) first.
    pub fn capabilities(mut self, capabilities: NetworkCapabilities) -> Self {
        if let Some(coupling) = self.config.coupling.as_mut() {
            coupling.capabilities = capabilities;
        }
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimulationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
