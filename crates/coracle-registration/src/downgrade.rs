//! Schema downgrade contract
//!
//! Local resources are authored at IS-04 v1.3; older registries accept older
//! schemas. The downgrade transformation itself is an external concern; the
//! engine only pins its call shape: the wire-protocol source version, the
//! resource type, the payload, and the registry's requested version.

use coracle_model::{ApiVersion, ResourceType};
use serde_json::Value;

/// Adapts a resource payload to the schema version a registry accepts
pub trait SchemaDowngrade: Send + Sync {
    /// Transform a payload from `source_version` for a registry at
    /// `registry_version`
    fn downgrade(
        &self,
        source_version: ApiVersion,
        kind: ResourceType,
        data: &Value,
        registry_version: ApiVersion,
    ) -> Value;
}

/// Identity downgrade for registries at or above the source version
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDowngrade;

impl SchemaDowngrade for PassthroughDowngrade {
    fn downgrade(
        &self,
        _source_version: ApiVersion,
        _kind: ResourceType,
        data: &Value,
        _registry_version: ApiVersion,
    ) -> Value {
        data.clone()
    }
}
