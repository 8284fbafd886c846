//! Discovery of Registration APIs
//!
//! One DNS-SD browse of `_nmos-registration._tcp` yields a priority-ordered
//! candidate list. When the browse comes back empty and a fallback registry
//! is configured, the fallback is inserted at the unadvertised priority so
//! the node can still register.

use async_trait::async_trait;
use coracle_core::error::Result;
use coracle_core::settings::Settings;
use coracle_model::{RegistrationService, RegistrationServices, ServicePriority, SharedModel};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Browses DNS-SD for Registration APIs
///
/// One call performs one resolution with no cancellation; implementations
/// bound the collection window themselves.
#[async_trait]
pub trait RegistrationBrowser: Send + Sync {
    /// Resolve currently advertised Registration APIs
    async fn browse(&self) -> Result<Vec<RegistrationService>>;
}

/// Build the fallback Registration API from settings, if one is configured
pub fn fallback_registration_service(settings: &Settings) -> Option<RegistrationService> {
    let address = settings.registry_address.as_ref()?;

    Some(RegistrationService::new(
        ServicePriority::NO_PRIORITY,
        format!(
            "http://{}:{}/x-nmos/registration/{}",
            address, settings.registration_port, settings.registry_version
        ),
    ))
}

/// Browse for Registration APIs, merging in the configured fallback
///
/// The fallback is only consulted when the browse discovers nothing.
pub async fn discover_registration_services(
    browser: &dyn RegistrationBrowser,
    fallback: Option<&RegistrationService>,
) -> RegistrationServices {
    info!("attempting discovery of a registration api");

    let discovered = match browser.browse().await {
        Ok(discovered) => discovered,
        Err(error) => {
            warn!(%error, "dns-sd browse failed");
            Vec::new()
        }
    };

    let mut services: RegistrationServices = discovered.into_iter().collect();

    if !services.is_empty() {
        info!(count = services.len(), "discovered registration api(s)");
    } else {
        warn!("did not discover a suitable registration api via dns-sd");

        if let Some(fallback) = fallback {
            services.insert(fallback.clone());
        }
    }

    services
}

/// Periodic rediscovery run in the background during peer-to-peer operation
///
/// Browses every `interval` until something turns up, then publishes the
/// candidate list and the discovered flag under the model lock, notifies,
/// and terminates. Cancellation is silent.
pub async fn background_discovery(
    shared: Arc<SharedModel>,
    browser: Arc<dyn RegistrationBrowser>,
    fallback: Option<RegistrationService>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("background discovery cancelled");
                return;
            }
            _ = tokio::time::sleep(interval) => {
                let services =
                    discover_registration_services(browser.as_ref(), fallback.as_ref()).await;

                if !services.is_empty() {
                    let mut state = shared.lock();
                    state.registration_services = services;
                    state.flags.registration_services_discovered = true;
                    drop(state);
                    shared.notify_all();
                    return;
                }
            }
        }
    }
}
