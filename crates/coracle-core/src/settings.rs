//! Engine settings
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.
//!
//! Settings are read-only to the behaviour engine; they are authored by the
//! embedding process and shared under the model lock.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings consumed by the node behaviour engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Priority carried on service advertisements
    ///
    /// `SERVICE_PRIORITY_NO_PRIORITY` (100) disables advertisement entirely
    /// and lets the node run unadvertised.
    #[serde(default = "default_pri")]
    pub pri: u32,

    /// Primary address on which the Node API is reachable
    #[serde(default = "default_host_address")]
    pub host_address: String,

    /// Additional addresses on which the Node API is reachable
    #[serde(default)]
    pub host_addresses: Option<Vec<String>>,

    /// Fallback registry host used when DNS-SD discovers nothing
    #[serde(default)]
    pub registry_address: Option<String>,

    /// Registration API port of the fallback registry
    #[serde(default = "default_registration_port")]
    pub registration_port: u16,

    /// IS-04 version requested from the fallback registry (e.g. "v1.2")
    #[serde(default = "default_registry_version")]
    pub registry_version: String,

    /// Interval between registration heartbeats in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub registration_heartbeat_interval_secs: u64,

    /// Minimum exponential backoff between discovery attempts in seconds
    #[serde(default = "default_backoff_min")]
    pub discovery_backoff_min_secs: f64,

    /// Maximum exponential backoff between discovery attempts in seconds
    #[serde(default = "default_backoff_max")]
    pub discovery_backoff_max_secs: f64,

    /// Growth factor applied to the discovery backoff
    #[serde(default = "default_backoff_factor")]
    pub discovery_backoff_factor: f64,

    /// Node API port carried in the mDNS advertisement
    #[serde(default = "default_node_port")]
    pub node_port: u16,
}

fn default_pri() -> u32 {
    SERVICE_PRIORITY_NO_PRIORITY
}

fn default_host_address() -> String {
    "127.0.0.1".to_string()
}

fn default_registration_port() -> u16 {
    REGISTRATION_PORT_DEFAULT
}

fn default_registry_version() -> String {
    REGISTRY_VERSION_DEFAULT.to_string()
}

fn default_heartbeat_interval() -> u64 {
    REGISTRATION_HEARTBEAT_INTERVAL_SECS_DEFAULT
}

fn default_backoff_min() -> f64 {
    DISCOVERY_BACKOFF_MIN_SECS_DEFAULT
}

fn default_backoff_max() -> f64 {
    DISCOVERY_BACKOFF_MAX_SECS_DEFAULT
}

fn default_backoff_factor() -> f64 {
    DISCOVERY_BACKOFF_FACTOR_DEFAULT
}

fn default_node_port() -> u16 {
    NODE_PORT_DEFAULT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pri: default_pri(),
            host_address: default_host_address(),
            host_addresses: None,
            registry_address: None,
            registration_port: default_registration_port(),
            registry_version: default_registry_version(),
            registration_heartbeat_interval_secs: default_heartbeat_interval(),
            discovery_backoff_min_secs: default_backoff_min(),
            discovery_backoff_max_secs: default_backoff_max(),
            discovery_backoff_factor: default_backoff_factor(),
            node_port: default_node_port(),
        }
    }
}

impl Settings {
    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.host_address.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "host_address".into(),
                reason: "must not be empty".into(),
            });
        }

        if self.registration_heartbeat_interval_secs == 0 {
            return Err(Error::InvalidConfiguration {
                field: "registration_heartbeat_interval_secs".into(),
                reason: "must be at least 1".into(),
            });
        }

        if !self.registry_version.starts_with('v') {
            return Err(Error::InvalidConfiguration {
                field: "registry_version".into(),
                reason: "must be a version label like \"v1.2\"".into(),
            });
        }

        if self.discovery_backoff_min_secs < 0.0 {
            return Err(Error::InvalidConfiguration {
                field: "discovery_backoff_min_secs".into(),
                reason: "must not be negative".into(),
            });
        }

        if self.discovery_backoff_max_secs < self.discovery_backoff_min_secs {
            return Err(Error::InvalidConfiguration {
                field: "discovery_backoff_max_secs".into(),
                reason: "must be at least discovery_backoff_min_secs".into(),
            });
        }

        if self.discovery_backoff_factor < 1.0 {
            return Err(Error::InvalidConfiguration {
                field: "discovery_backoff_factor".into(),
                reason: "must be at least 1.0".into(),
            });
        }

        Ok(())
    }

    /// Interval between registration heartbeats
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.registration_heartbeat_interval_secs)
    }

    /// Interval of the background rediscovery performed during peer-to-peer
    /// operation
    pub fn rediscovery_interval(&self) -> Duration {
        Duration::from_secs_f64(self.discovery_backoff_max_secs)
    }

    /// Whether the node is allowed to advertise itself
    pub fn is_advertised(&self) -> bool {
        self.pri != SERVICE_PRIORITY_NO_PRIORITY
    }
}
