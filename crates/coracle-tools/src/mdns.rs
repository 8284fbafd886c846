//! DNS-SD adapters over mdns-sd
//!
//! Advertises `_nmos-node._tcp` and browses `_nmos-registration._tcp` per
//! RFC 6762/6763. The daemon is owned for the adapter's lifetime; TXT
//! updates re-register the service, which replaces the published record set.

use async_trait::async_trait;
use coracle_core::constants::{
    DISCOVERY_BROWSE_TIMEOUT_SECS_DEFAULT, NODE_SERVICE_TYPE, REGISTRATION_SERVICE_TYPE,
};
use coracle_core::error::{Error, Result};
use coracle_model::{ApiVersion, RegistrationService, ServicePriority};
use coracle_registration::{NodeAdvertiser, RegistrationBrowser, TxtRecord};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// DNS-SD service types carry the `.local.` domain on the wire
fn full_type(service_type: &str) -> String {
    format!("{}.local.", service_type)
}

// =============================================================================
// Advertiser
// =============================================================================

/// Advertises the node service over mDNS
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    instance_name: String,
    host_name: String,
    port: u16,
}

impl MdnsAdvertiser {
    /// Create an advertiser for the given service instance name and Node API
    /// port
    pub fn new(instance_name: impl Into<String>, port: u16) -> Result<Self> {
        let daemon =
            ServiceDaemon::new().map_err(|e| Error::advertisement_failed(e.to_string()))?;

        let host = hostname::get()
            .map(|host| host.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());

        Ok(Self {
            daemon,
            instance_name: instance_name.into(),
            host_name: format!("{}.local.", host),
            port,
        })
    }

    fn fullname(&self) -> String {
        format!("{}.{}", self.instance_name, full_type(NODE_SERVICE_TYPE))
    }

    fn publish(&self, records: &[TxtRecord]) -> Result<()> {
        let properties: HashMap<String, String> = records.iter().cloned().collect();

        let info = ServiceInfo::new(
            &full_type(NODE_SERVICE_TYPE),
            &self.instance_name,
            &self.host_name,
            "",
            self.port,
            properties,
        )
        .map_err(|e| Error::advertisement_failed(e.to_string()))?
        .enable_addr_auto();

        self.daemon
            .register(info)
            .map_err(|e| Error::advertisement_failed(e.to_string()))?;

        debug!(instance = %self.instance_name, records = records.len(), "node service published");
        Ok(())
    }
}

impl NodeAdvertiser for MdnsAdvertiser {
    fn register(&self, records: &[TxtRecord]) -> Result<()> {
        self.publish(records)
    }

    fn update(&self, records: &[TxtRecord]) -> Result<()> {
        // re-registering an existing instance replaces its TXT record set
        self.publish(records)
    }

    fn withdraw(&self) -> Result<()> {
        self.daemon
            .unregister(&self.fullname())
            .map(|_| ())
            .map_err(|e| Error::advertisement_failed(e.to_string()))
    }
}

// =============================================================================
// Browser
// =============================================================================

/// Browses for Registration APIs over mDNS
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    preferred_version: ApiVersion,
    browse_timeout: Duration,
}

impl MdnsBrowser {
    /// Create a browser preferring registries at or below the given version
    pub fn new(preferred_version: ApiVersion) -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| Error::discovery_failed(e.to_string()))?;

        Ok(Self {
            daemon,
            preferred_version,
            browse_timeout: Duration::from_secs(DISCOVERY_BROWSE_TIMEOUT_SECS_DEFAULT),
        })
    }

    /// Override how long one browse collects responses
    pub fn with_browse_timeout(mut self, timeout: Duration) -> Self {
        self.browse_timeout = timeout;
        self
    }
}

#[async_trait]
impl RegistrationBrowser for MdnsBrowser {
    async fn browse(&self) -> Result<Vec<RegistrationService>> {
        let service_type = full_type(REGISTRATION_SERVICE_TYPE);
        let receiver = self
            .daemon
            .browse(&service_type)
            .map_err(|e| Error::discovery_failed(e.to_string()))?;

        let preferred = self.preferred_version;
        let window = self.browse_timeout;

        let services = tokio::task::spawn_blocking(move || {
            let mut services = Vec::new();
            let deadline = Instant::now() + window;

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }

                match receiver.recv_timeout(remaining) {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        match registration_service_from(&info, preferred) {
                            Some(service) => services.push(service),
                            None => {
                                warn!(fullname = %info.get_fullname(), "ignoring unusable registration service");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }

            services
        })
        .await
        .map_err(|e| Error::discovery_failed(e.to_string()))?;

        if let Err(e) = self.daemon.stop_browse(&service_type) {
            debug!(error = %e, "stop browse failed");
        }

        Ok(services)
    }
}

/// Interpret one resolved `_nmos-registration._tcp` advertisement
///
/// Requires a parseable `pri`, an http `api_proto`, an address, and an
/// advertised API version at or below the preferred one (the highest such
/// version wins).
fn registration_service_from(
    info: &ServiceInfo,
    preferred: ApiVersion,
) -> Option<RegistrationService> {
    let pri: u32 = info.get_property_val_str("pri")?.trim().parse().ok()?;

    let proto = info.get_property_val_str("api_proto").unwrap_or("http");
    if proto != "http" {
        return None;
    }

    let version = info
        .get_property_val_str("api_ver")
        .unwrap_or("v1.2")
        .split(',')
        .filter_map(|label| ApiVersion::parse(label.trim()).ok())
        .filter(|version| *version <= preferred)
        .max()?;

    let addresses = info.get_addresses();
    let address = addresses
        .iter()
        .find(|address| address.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()?;

    Some(RegistrationService::new(
        ServicePriority(pri),
        format!(
            "http://{}:{}/x-nmos/registration/{}",
            address,
            info.get_port(),
            version
        ),
    ))
}
