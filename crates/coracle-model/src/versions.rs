//! Peer-to-peer `ver_*` counters
//!
//! One non-decreasing counter per public resource type, published as mDNS
//! TXT records while the node runs peer-to-peer. Counters are scoped to the
//! engine's lifetime and reset only on process restart.

use crate::resource::ResourceType;

/// The `ver_*` counter set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiResourceVersions {
    /// `ver_self` — changes to the node resource itself
    pub node: u64,
    pub devices: u64,
    pub sources: u64,
    pub flows: u64,
    pub senders: u64,
    pub receivers: u64,
}

impl ApiResourceVersions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more change for the given resource type
    ///
    /// Subscription and grain changes are never counted; they are not
    /// visible on the Node API.
    pub fn increment(&mut self, kind: ResourceType) {
        match kind {
            ResourceType::Node => self.node += 1,
            ResourceType::Device => self.devices += 1,
            ResourceType::Source => self.sources += 1,
            ResourceType::Flow => self.flows += 1,
            ResourceType::Sender => self.senders += 1,
            ResourceType::Receiver => self.receivers += 1,
            ResourceType::Subscription | ResourceType::Grain => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let ver = ApiResourceVersions::new();
        assert_eq!(ver.node, 0);
        assert_eq!(ver.receivers, 0);
    }

    #[test]
    fn test_increment_per_type() {
        let mut ver = ApiResourceVersions::new();
        ver.increment(ResourceType::Sender);
        ver.increment(ResourceType::Sender);
        ver.increment(ResourceType::Node);

        assert_eq!(ver.senders, 2);
        assert_eq!(ver.node, 1);
        assert_eq!(ver.devices, 0);
    }

    #[test]
    fn test_synthetic_types_not_counted() {
        let mut ver = ApiResourceVersions::new();
        ver.increment(ResourceType::Subscription);
        ver.increment(ResourceType::Grain);
        assert_eq!(ver, ApiResourceVersions::default());
    }
}
