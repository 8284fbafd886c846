//! Resource types and identification
//!
//! TigerStyle: Explicit resource taxonomy with validated identifiers.

use coracle_core::constants::RESOURCE_ID_LENGTH_BYTES_MAX;
use coracle_core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Unique identifier for a resource
///
/// IS-04 resource ids are UUIDs; ids remain stable for the lifetime of the
/// resource they name.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Create a new Id with validation
    ///
    /// # Errors
    /// Returns error if the id is empty, too long, or contains characters
    /// outside alphanumerics, dashes, underscores and dots.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidResourceId {
                id,
                reason: "resource ID cannot be empty".into(),
            });
        }

        if id.len() > RESOURCE_ID_LENGTH_BYTES_MAX {
            return Err(Error::InvalidResourceId {
                reason: format!(
                    "resource ID length {} exceeds limit {}",
                    id.len(),
                    RESOURCE_ID_LENGTH_BYTES_MAX
                ),
                id,
            });
        }

        let valid = id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.');

        if !valid {
            return Err(Error::InvalidResourceId {
                id,
                reason: "resource ID contains invalid characters".into(),
            });
        }

        Ok(Self(id))
    }

    /// Generate a fresh UUID v4 id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An IS-04 API version such as `v1.2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    /// IS-04 v1.2, the version the wire protocol of this engine targets
    pub const V1_2: ApiVersion = ApiVersion { major: 1, minor: 2 };

    /// IS-04 v1.3, the version local resources are authored at
    pub const V1_3: ApiVersion = ApiVersion { major: 1, minor: 3 };

    /// Parse a version label like `"v1.2"`
    pub fn parse(label: &str) -> Result<Self> {
        let invalid = || Error::InvalidApiVersion {
            version: label.to_string(),
        };

        let rest = label.strip_prefix('v').ok_or_else(invalid)?;
        let (major, minor) = rest.split_once('.').ok_or_else(invalid)?;

        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

impl std::str::FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The kind of a resource held in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Node,
    Device,
    Source,
    Flow,
    Sender,
    Receiver,
    Subscription,
    Grain,
}

impl ResourceType {
    /// Singular name used in registration request bodies
    pub fn name(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Device => "device",
            Self::Source => "source",
            Self::Flow => "flow",
            Self::Sender => "sender",
            Self::Receiver => "receiver",
            Self::Subscription => "subscription",
            Self::Grain => "grain",
        }
    }

    /// Plural form used in event paths and DELETE request paths
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Node => "nodes",
            Self::Device => "devices",
            Self::Source => "sources",
            Self::Flow => "flows",
            Self::Sender => "senders",
            Self::Receiver => "receivers",
            Self::Subscription => "subscriptions",
            Self::Grain => "grains",
        }
    }

    /// Parse a plural form back into a resource type
    pub fn from_plural(plural: &str) -> Result<Self> {
        match plural {
            "nodes" => Ok(Self::Node),
            "devices" => Ok(Self::Device),
            "sources" => Ok(Self::Source),
            "flows" => Ok(Self::Flow),
            "senders" => Ok(Self::Sender),
            "receivers" => Ok(Self::Receiver),
            "subscriptions" => Ok(Self::Subscription),
            "grains" => Ok(Self::Grain),
            _ => Err(Error::invalid_event_path(plural)),
        }
    }

    /// Whether the type is exposed on the Node API
    ///
    /// Only public resources produce events; the engine's synthetic
    /// subscription and grain are invisible to it.
    pub fn is_public(&self) -> bool {
        !matches!(self, Self::Subscription | Self::Grain)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Monotone update stamp assigned by the store
///
/// Strictly increases across every store mutation; used by the engine to
/// detect grain changes without enumerating the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

/// A resource held in the store
///
/// The `data` payload is opaque JSON authored at [`ApiVersion::V1_3`];
/// the engine only reads it to build registration request bodies.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: Id,
    pub kind: ResourceType,
    pub version: ApiVersion,
    pub data: Value,
    pub updated: Tick,
}

impl Resource {
    /// Create a resource; the update stamp is assigned by the store on
    /// insertion
    pub fn new(id: Id, kind: ResourceType, version: ApiVersion, data: Value) -> Self {
        Self {
            id,
            kind,
            version,
            data,
            updated: Tick::default(),
        }
    }
}
