//! Coracle Model
//!
//! The node's local resource inventory and the event plumbing the behaviour
//! engine feeds on.
//!
//! # Overview
//!
//! - [`Resource`] / [`ResourceStore`]: an indexed collection of IS-04
//!   resources where every mutation is stamped with a strictly increasing
//!   update tick and mirrored as a [`ResourceEvent`] into the engine's grain
//! - [`grain`]: the synthetic subscription + grain pair and the
//!   take-then-restore drain used by the synchroniser
//! - [`RegistrationServices`]: the priority-ordered candidate registry list
//! - [`ApiResourceVersions`]: the monotone `ver_*` counters published during
//!   peer-to-peer operation
//! - [`SharedModel`]: the single mutex + condition variable every engine
//!   phase and background task coordinates through
//!
//! # TigerStyle
//! - Explicit update stamps, no hidden clocks
//! - The grain is re-looked-up by id on every access, never held by pointer

pub mod events;
pub mod grain;
pub mod model;
pub mod resource;
pub mod services;
pub mod store;
pub mod versions;

pub use events::{EventKind, ResourceEvent};
pub use grain::{make_grain, make_grain_subscription, GrainDrain};
pub use model::{BehaviourFlags, NodeModel, SharedModel};
pub use resource::{ApiVersion, Id, Resource, ResourceType, Tick};
pub use services::{RegistrationService, RegistrationServices, ServicePriority};
pub use store::ResourceStore;
pub use versions::ApiResourceVersions;
