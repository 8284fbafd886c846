//! Coracle Tools
//!
//! Production implementations of the contracts the behaviour engine
//! consumes:
//!
//! - [`ReqwestHttpClient`]: the [`coracle_core::HttpClient`] used on the wire
//! - [`MdnsAdvertiser`] / [`MdnsBrowser`]: DNS-SD advertisement and browsing
//!   over mdns-sd
//!
//! Tests swap these for scripted doubles; nothing in the engine depends on
//! this crate.

pub mod http_client;
pub mod mdns;

pub use http_client::{default_http_client, ReqwestHttpClient};
pub use mdns::{MdnsAdvertiser, MdnsBrowser};
