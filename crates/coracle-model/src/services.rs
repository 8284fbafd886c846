//! Candidate registration services
//!
//! Discovered Registration APIs are kept in a priority-ordered multimap:
//! smaller priority value wins, ties keep their discovery order. The engine
//! always talks to the top entry and pops it on a service error.

use coracle_core::constants::{SERVICE_PRIORITY_HIGHEST, SERVICE_PRIORITY_NO_PRIORITY};
use serde::{Deserialize, Serialize};
use std::fmt;

/// DNS-SD `pri` TXT record value; lower is preferred
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ServicePriority(pub u32);

impl ServicePriority {
    /// The reserved "unadvertised" sentinel (numerically the least
    /// preferred class); the configured fallback registry lives here
    pub const NO_PRIORITY: ServicePriority = ServicePriority(SERVICE_PRIORITY_NO_PRIORITY);

    /// The most preferred priority
    pub const HIGHEST: ServicePriority = ServicePriority(SERVICE_PRIORITY_HIGHEST);

    /// Whether this priority marks an unadvertised service
    pub fn is_unadvertised(&self) -> bool {
        self.0 >= SERVICE_PRIORITY_NO_PRIORITY
    }
}

impl fmt::Display for ServicePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A discovered Registration API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationService {
    pub priority: ServicePriority,
    /// Base URI like `http://reg.local:3210/x-nmos/registration/v1.2`
    pub base_uri: String,
}

impl RegistrationService {
    pub fn new(priority: ServicePriority, base_uri: impl Into<String>) -> Self {
        Self {
            priority,
            base_uri: base_uri.into(),
        }
    }
}

/// Priority-ordered multimap of candidate registration services
///
/// Invariant: entries are sorted by priority; insertion is stable so equal
/// priorities keep their arrival order. The selected registry is always the
/// front entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationServices {
    services: Vec<RegistrationService>,
}

impl RegistrationServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping priority order; stable for equal priorities
    pub fn insert(&mut self, service: RegistrationService) {
        let position = self
            .services
            .partition_point(|existing| existing.priority <= service.priority);
        self.services.insert(position, service);
    }

    /// The service the engine should currently be talking to
    pub fn top(&self) -> Option<&RegistrationService> {
        self.services.first()
    }

    /// Drop the current service after it failed to respond correctly
    pub fn pop_top(&mut self) -> Option<RegistrationService> {
        if self.services.is_empty() {
            None
        } else {
            Some(self.services.remove(0))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistrationService> {
        self.services.iter()
    }
}

impl FromIterator<RegistrationService> for RegistrationServices {
    fn from_iter<T: IntoIterator<Item = RegistrationService>>(iter: T) -> Self {
        let mut services = Self::new();
        for service in iter {
            services.insert(service);
        }
        services
    }
}
