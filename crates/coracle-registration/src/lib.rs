//! Coracle Registration
//!
//! The IS-04 node behaviour engine: a long-running worker that keeps the
//! node's resource inventory synchronised with a Registration API and falls
//! back to peer-to-peer mDNS advertisement when no registry is reachable.
//!
//! # Overview
//!
//! The engine implements the "Standard Registration Sequences" of
//! AMWA IS-04 v1.2:
//!
//! ```text
//! initial_discovery → initial_registration → registered_operation
//!          ↑ ↓                                      ↓
//!     rediscovery ←─────────────────────────────────┘
//!          ↓
//!     peer_to_peer_operation → initial_registration
//! ```
//!
//! External collaborators are consumed through narrow contracts:
//! [`coracle_core::HttpClient`] for the wire, [`RegistrationBrowser`] and
//! [`NodeAdvertiser`] for DNS-SD, [`SchemaDowngrade`] for payload
//! adaptation. Production implementations live in `coracle-tools`.
//!
//! # Example
//!
//! ```rust,ignore
//! use coracle_registration::NodeBehaviour;
//!
//! let shared = Arc::new(SharedModel::new(settings));
//! let behaviour = NodeBehaviour::new(shared.clone(), http, browser, advertiser, downgrade);
//! let worker = tokio::spawn(behaviour.run());
//!
//! // ... mutate the store through `shared` ...
//!
//! shared.shutdown();
//! worker.await??;
//! ```

mod advertise;
mod behaviour;
mod client;
mod discovery;
mod downgrade;
mod heartbeat;

pub use advertise::{
    advertise_node_service, make_txt_records, make_ver_records, update_node_service,
    update_node_service_with_versions, NodeAdvertiser, TxtRecord,
};
pub use behaviour::NodeBehaviour;
pub use client::{RegistrationClient, RegistrationError, RegistrationResult};
pub use discovery::{
    background_discovery, discover_registration_services, fallback_registration_service,
    RegistrationBrowser,
};
pub use downgrade::{PassthroughDowngrade, SchemaDowngrade};
pub use heartbeat::heartbeat_loop;
