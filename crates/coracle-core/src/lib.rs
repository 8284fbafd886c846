//! Coracle Core
//!
//! Core types, errors, and constants for the coracle NMOS node behaviour
//! engine.
//!
//! # Overview
//!
//! Coracle keeps a media node's local resource inventory synchronised with an
//! AMWA IS-04 Registration API, falling back to peer-to-peer mDNS
//! advertisement when no registry is reachable. This crate holds the pieces
//! shared by every other workspace member:
//!
//! - Workspace-wide error type and result alias
//! - Explicit limits and protocol constants
//! - The abstract HTTP client contract the engine is written against
//! - Engine settings with validation
//! - Telemetry bootstrap
//!
//! # TigerStyle
//!
//! This workspace follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g. `HTTP_CLIENT_TIMEOUT_MS_DEFAULT`)
//! - Assertions on invariants, bounded iteration only

pub mod constants;
pub mod error;
pub mod http;
pub mod settings;
pub mod telemetry;

pub use constants::*;
pub use error::{Error, Result};
pub use http::{HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, HttpResult};
pub use settings::Settings;
pub use telemetry::{init_telemetry, TelemetryConfig};
