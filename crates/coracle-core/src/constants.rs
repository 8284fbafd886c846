//! TigerStyle constants for coracle
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Registration API
// =============================================================================

/// Default interval between registration heartbeats in seconds
///
/// IS-04: "Nodes are expected to perform a heartbeat every 5 seconds by
/// default."
pub const REGISTRATION_HEARTBEAT_INTERVAL_SECS_DEFAULT: u64 = 5;

/// Default TCP port of the Registration API
pub const REGISTRATION_PORT_DEFAULT: u16 = 3210;

/// Default TCP port of the Node API carried in the node advertisement
pub const NODE_PORT_DEFAULT: u16 = 3212;

/// Default IS-04 version requested from the registry
pub const REGISTRY_VERSION_DEFAULT: &str = "v1.2";

// =============================================================================
// Discovery
// =============================================================================

/// Minimum exponential backoff between discovery attempts in seconds
pub const DISCOVERY_BACKOFF_MIN_SECS_DEFAULT: f64 = 1.0;

/// Maximum exponential backoff between discovery attempts in seconds
///
/// Also used as the interval of the background rediscovery performed during
/// peer-to-peer operation.
pub const DISCOVERY_BACKOFF_MAX_SECS_DEFAULT: f64 = 30.0;

/// Growth factor applied to the discovery backoff on each registration cycle
pub const DISCOVERY_BACKOFF_FACTOR_DEFAULT: f64 = 1.5;

/// How long a single DNS-SD browse collects responses, in seconds
pub const DISCOVERY_BROWSE_TIMEOUT_SECS_DEFAULT: u64 = 2;

// =============================================================================
// Service Priority
// =============================================================================

/// The reserved "unadvertised" service priority
///
/// A node configured with this priority does not advertise itself; a
/// registration service carrying it is only ever used as a last resort
/// (the configured fallback registry is inserted at this priority).
pub const SERVICE_PRIORITY_NO_PRIORITY: u32 = 100;

/// The most preferred service priority
pub const SERVICE_PRIORITY_HIGHEST: u32 = 0;

// =============================================================================
// HTTP Limits
// =============================================================================

/// Default HTTP request timeout in milliseconds
pub const HTTP_CLIENT_TIMEOUT_MS_DEFAULT: u64 = 30_000;

/// Maximum accepted response body size in bytes (10 MB)
pub const HTTP_CLIENT_RESPONSE_BYTES_MAX: u64 = 10 * 1024 * 1024;

// =============================================================================
// Resource Limits
// =============================================================================

/// Maximum length of a resource ID in bytes
pub const RESOURCE_ID_LENGTH_BYTES_MAX: usize = 128;

// =============================================================================
// mDNS Service Types
// =============================================================================

/// DNS-SD service type advertised by nodes
pub const NODE_SERVICE_TYPE: &str = "_nmos-node._tcp";

/// DNS-SD service type advertised by registries
pub const REGISTRATION_SERVICE_TYPE: &str = "_nmos-registration._tcp";

// Compile-time assertions for constant validity
const _: () = {
    assert!(DISCOVERY_BACKOFF_MIN_SECS_DEFAULT <= DISCOVERY_BACKOFF_MAX_SECS_DEFAULT);
    assert!(DISCOVERY_BACKOFF_FACTOR_DEFAULT >= 1.0);
    assert!(REGISTRATION_HEARTBEAT_INTERVAL_SECS_DEFAULT >= 1);
    assert!(RESOURCE_ID_LENGTH_BYTES_MAX >= 36); // room for a UUID
    assert!(SERVICE_PRIORITY_HIGHEST < SERVICE_PRIORITY_NO_PRIORITY);
};
