//! The node behaviour engine
//!
//! Implements the IS-04 "Standard Registration Sequences": DNS-SD discovery
//! of a Registration API, initial registration of the node, registered
//! operation with background heartbeats, rediscovery on failure, and
//! peer-to-peer advertisement when no registry is reachable.
//!
//! One worker drives the mode state machine. The resource store, settings,
//! candidate registry list and behaviour flags all live under the single
//! model lock; the worker suspends only at condition-variable waits, the
//! timed discovery backoff, and HTTP requests issued with the lock
//! released.

use crate::advertise::{
    advertise_node_service, update_node_service, update_node_service_with_versions, NodeAdvertiser,
};
use crate::client::{RegistrationClient, RegistrationError};
use crate::discovery::{
    background_discovery, discover_registration_services, fallback_registration_service,
    RegistrationBrowser,
};
use crate::downgrade::SchemaDowngrade;
use crate::heartbeat::heartbeat_loop;
use coracle_core::error::{Error, Result};
use coracle_core::http::HttpClient;
use coracle_model::{
    make_grain, make_grain_subscription, ApiResourceVersions, EventKind, GrainDrain, Id,
    ResourceType, SharedModel, Tick,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The possible states of node behaviour: the two primary modes (registered
/// operation and peer-to-peer operation) and the ephemeral states the node
/// works through between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    InitialDiscovery,
    InitialRegistration,
    RegisteredOperation,
    Rediscovery,
    PeerToPeerOperation,
}

/// The node behaviour engine
///
/// Owns the node advertisement and the synthetic subscription/grain for its
/// whole lifetime; everything else is reached through the shared model.
pub struct NodeBehaviour {
    shared: Arc<SharedModel>,
    http: Arc<dyn HttpClient>,
    browser: Arc<dyn RegistrationBrowser>,
    advertiser: Arc<dyn NodeAdvertiser>,
    downgrade: Arc<dyn SchemaDowngrade>,
    grain_id: Id,
    /// Identified during initial registration from the node's own
    /// added/sync event; stable for the lifetime of the process
    self_id: Option<Id>,
    discovery_backoff_secs: f64,
    /// Peer-to-peer change counters; never reset while the engine lives
    ver: ApiResourceVersions,
}

impl NodeBehaviour {
    pub fn new(
        shared: Arc<SharedModel>,
        http: Arc<dyn HttpClient>,
        browser: Arc<dyn RegistrationBrowser>,
        advertiser: Arc<dyn NodeAdvertiser>,
        downgrade: Arc<dyn SchemaDowngrade>,
    ) -> Self {
        Self {
            shared,
            http,
            browser,
            advertiser,
            downgrade,
            grain_id: Id::generate(),
            self_id: None,
            discovery_backoff_secs: 0.0,
            ver: ApiResourceVersions::new(),
        }
    }

    /// Drive the engine until shutdown is requested
    ///
    /// An `Err` return means a programmer error (malformed store state);
    /// environmental failures are absorbed by the mode machine.
    pub async fn run(mut self) -> Result<()> {
        // the node advertisement is held for the engine's whole lifetime
        {
            let state = self.shared.lock();
            if let Err(error) = advertise_node_service(self.advertiser.as_ref(), &state.settings) {
                warn!(%error, "node advertisement failed");
            }
        }

        // the synthetic subscription and grain tracking all resource events
        {
            let mut state = self.shared.lock();
            let subscription_id = Id::generate();
            state
                .resources
                .insert(make_grain_subscription(&subscription_id))?;
            state
                .resources
                .insert(make_grain(&self.grain_id, &subscription_id))?;
            state.resources.install_grain(self.grain_id.clone());
        }

        let result = self.run_modes().await;

        if let Err(error) = self.advertiser.withdraw() {
            warn!(%error, "node advertisement withdrawal failed");
        }

        result
    }

    async fn run_modes(&mut self) -> Result<()> {
        let mut mode = Mode::InitialDiscovery;

        loop {
            if self.shared.lock().shutdown {
                break;
            }

            mode = match mode {
                Mode::InitialDiscovery => self.initial_discovery().await?,

                Mode::InitialRegistration => {
                    self.initial_registration().await?;

                    if !self.shared.lock().registration_services.is_empty() {
                        self.discovery_backoff_secs = 0.0;
                        Mode::RegisteredOperation
                    } else {
                        Mode::InitialDiscovery
                    }
                }

                Mode::RegisteredOperation => {
                    self.registered_operation().await?;

                    if !self.shared.lock().registration_services.is_empty() {
                        // a 404 on heartbeat: the node must re-register each
                        // of its resources in order
                        Mode::InitialRegistration
                    } else {
                        // no further registration services available; a
                        // re-query may be performed
                        Mode::Rediscovery
                    }
                }

                Mode::Rediscovery => self.rediscovery().await?,

                Mode::PeerToPeerOperation => {
                    self.peer_to_peer_operation().await?;

                    if !self.shared.lock().registration_services.is_empty() {
                        Mode::InitialRegistration
                    } else {
                        Mode::PeerToPeerOperation
                    }
                }
            };
        }

        Ok(())
    }

    /// Browse for Registration APIs, backing off exponentially between
    /// attempts
    async fn initial_discovery(&mut self) -> Result<Mode> {
        let shared = Arc::clone(&self.shared);

        if self.discovery_backoff_secs > 0.0 {
            let backoff = Duration::from_secs_f64(self.discovery_backoff_secs);
            let shutdown = {
                let state = shared.wait_for_until(backoff, |model| model.shutdown).await;
                state.shutdown
            };
            if shutdown {
                return Ok(Mode::InitialDiscovery);
            }
        }

        let fallback = {
            let state = shared.lock();
            fallback_registration_service(&state.settings)
        };

        let services =
            discover_registration_services(self.browser.as_ref(), fallback.as_ref()).await;

        let mut state = shared.lock();
        let found = !services.is_empty();
        state.registration_services = services;

        if found {
            // every entry to initial registration costs one exponential step
            // on the next failure
            self.discovery_backoff_secs = next_discovery_backoff(
                self.discovery_backoff_secs,
                state.settings.discovery_backoff_min_secs,
                state.settings.discovery_backoff_max_secs,
                state.settings.discovery_backoff_factor,
            );

            Ok(Mode::InitialRegistration)
        } else {
            // no Registration APIs advertised: assume peer-to-peer operation
            Ok(Mode::PeerToPeerOperation)
        }
    }

    /// Browse again after registered operation ran out of candidates;
    /// no backoff applies
    async fn rediscovery(&mut self) -> Result<Mode> {
        let shared = Arc::clone(&self.shared);

        let fallback = {
            let state = shared.lock();
            fallback_registration_service(&state.settings)
        };

        let services =
            discover_registration_services(self.browser.as_ref(), fallback.as_ref()).await;

        let mut state = shared.lock();
        let found = !services.is_empty();
        state.registration_services = services;

        Ok(if found {
            // another Registration API should be selected from the list
            Mode::RegisteredOperation
        } else {
            Mode::PeerToPeerOperation
        })
    }

    /// Register the node resource itself with the selected Registration API
    ///
    /// Drains the grain repeatedly, discarding events ahead of the node's
    /// own added/sync event; returns once the node is registered, the
    /// candidate list is exhausted, or shutdown is requested. Remaining
    /// events are consumed in registered operation.
    async fn initial_registration(&mut self) -> Result<()> {
        info!("attempting initial registration");

        let shared = Arc::clone(&self.shared);
        let mut client: Option<RegistrationClient> = None;
        let mut last_seen = Tick(0);

        {
            let mut state = shared.lock();
            state.flags.service_error = false;
            state.flags.node_registered = false;

            if state.resources.find(&self.grain_id).is_none() {
                return Err(Error::resource_not_found(self.grain_id.as_str()));
            }

            // reset the grain with a fresh snapshot of the store; if the
            // node resource is already present the first event is its sync
            // event
            let snapshot = state.resources.make_resource_events("", &json!({}));
            state
                .resources
                .reset_grain_events(&self.grain_id, snapshot)?;
        }

        loop {
            let grain_id = self.grain_id.clone();
            let seen = last_seen;
            let mut state = shared
                .wait_until(move |model| {
                    model.shutdown
                        || model.flags.service_error
                        || model.flags.node_registered
                        || model
                            .resources
                            .grain_updated(&grain_id)
                            .is_some_and(|updated| updated > seen)
                })
                .await;

            if state.flags.service_error {
                state.registration_services.pop_top();
                state.flags.service_error = false;
            }
            if state.shutdown
                || state.registration_services.is_empty()
                || state.flags.node_registered
            {
                return Ok(());
            }

            // the node selects a Registration API based on the priority
            let base_uri = match state.registration_services.top() {
                Some(top) => top.base_uri.clone(),
                None => return Ok(()),
            };
            let current = self.select_client(&mut client, &base_uri)?.0;

            let mut drain = GrainDrain::take(&mut state.resources, &self.grain_id)?;
            last_seen = state
                .resources
                .grain_updated(&self.grain_id)
                .unwrap_or(last_seen);

            let mut fatal = None;

            while let Some(event) = drain.front().cloned() {
                if state.shutdown || state.flags.service_error || state.flags.node_registered {
                    break;
                }

                let (id, kind) = match event.id_type() {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        fatal = Some(error);
                        break;
                    }
                };

                // registration cannot proceed before the node itself is
                // registered; discard events ahead of its added/sync event
                if !(kind == ResourceType::Node && event.kind.is_creation()) {
                    drain.pop_front();
                    continue;
                }

                self.self_id = Some(id);

                info!(registry = %current.base_uri(), "registering node with the registration api");

                // issue the request without the lock on the model
                drop(state);
                let outcome = current.register_event(&event).await;
                state = shared.lock();

                match outcome {
                    Ok(()) => {
                        // subsequent events are handled in registered
                        // operation
                        drain.pop_front();
                        state.flags.node_registered = true;
                    }
                    Err(RegistrationError::Internal(error)) => {
                        fatal = Some(error);
                        break;
                    }
                    Err(_) => {
                        state.flags.service_error = true;
                    }
                }
            }

            drain.restore(&mut state.resources)?;

            if let Some(error) = fatal {
                return Err(error);
            }
        }
    }

    /// Consume resource events against the selected Registration API while a
    /// background task persists the node with heartbeats
    async fn registered_operation(&mut self) -> Result<()> {
        info!("adopting registered operation");

        let shared = Arc::clone(&self.shared);

        let self_id = self
            .self_id
            .clone()
            .ok_or_else(|| Error::internal("registered operation without a registered node"))?;

        {
            let mut state = shared.lock();
            state.flags.service_error = false;
            state.flags.node_unregistered = false;
        }

        let mut client: Option<RegistrationClient> = None;
        let mut cancel = CancellationToken::new();
        let mut heartbeats: Option<tokio::task::JoinHandle<()>> = None;
        let mut last_seen = Tick(0);

        let result = loop {
            let grain_id = self.grain_id.clone();
            let seen = last_seen;
            let mut state = shared
                .wait_until(move |model| {
                    model.shutdown
                        || model.flags.service_error
                        || model.flags.node_unregistered
                        || model
                            .resources
                            .grain_updated(&grain_id)
                            .is_some_and(|updated| updated > seen)
                })
                .await;

            if state.flags.service_error {
                state.registration_services.pop_top();
                state.flags.service_error = false;

                // cancel without the lock: the heartbeat task acquires it to
                // publish its terminal flag
                drop(state);
                cancel.cancel();
                if let Some(task) = heartbeats.take() {
                    let _ = task.await;
                }
                cancel = CancellationToken::new();
                state = shared.lock();
            }
            if state.shutdown
                || state.registration_services.is_empty()
                || state.flags.node_unregistered
            {
                break Ok(());
            }

            let base_uri = match state.registration_services.top() {
                Some(top) => top.base_uri.clone(),
                None => break Ok(()),
            };
            let (current, switched) = match self.select_client(&mut client, &base_uri) {
                Ok(selected) => selected,
                Err(error) => break Err(error),
            };

            if switched {
                // the first interaction with a new Registration API is a
                // heartbeat confirming the node is still present
                drop(state);
                let probe = current.heartbeat(&self_id).await;
                state = shared.lock();

                match probe {
                    Ok(()) => {}
                    Err(RegistrationError::NodeUnknown) => {
                        state.flags.node_unregistered = true;
                    }
                    Err(RegistrationError::Service { .. }) => {
                        state.flags.service_error = true;
                    }
                    Err(RegistrationError::Internal(error)) => break Err(error),
                }

                if state.shutdown || state.flags.service_error || state.flags.node_unregistered {
                    continue;
                }

                // the node persists itself in the registry by heartbeats
                let interval = state.settings.heartbeat_interval();
                heartbeats = Some(tokio::spawn(heartbeat_loop(
                    Arc::clone(&shared),
                    current.clone(),
                    self_id.clone(),
                    interval,
                    cancel.clone(),
                )));
            }

            let mut drain = match GrainDrain::take(&mut state.resources, &self.grain_id) {
                Ok(drain) => drain,
                Err(error) => break Err(error),
            };
            last_seen = state
                .resources
                .grain_updated(&self.grain_id)
                .unwrap_or(last_seen);

            let mut fatal = None;

            while let Some(event) = drain.front().cloned() {
                if state.shutdown || state.flags.service_error || state.flags.node_unregistered {
                    break;
                }

                let (id, _kind) = match event.id_type() {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        fatal = Some(error);
                        break;
                    }
                };

                // issue the request without the lock on the model
                drop(state);
                let outcome = current.register_event(&event).await;
                state = shared.lock();

                match outcome {
                    Ok(()) => {
                        drain.pop_front();

                        // following deletion of all other resources the node
                        // resource may be deleted and heartbeating stopped
                        if id == self_id && event.kind == EventKind::Removed {
                            state.flags.node_unregistered = true;
                        }
                    }
                    Err(RegistrationError::Internal(error)) => {
                        fatal = Some(error);
                        break;
                    }
                    Err(_) => {
                        state.flags.service_error = true;
                    }
                }
            }

            if let Err(error) = drain.restore(&mut state.resources) {
                fatal.get_or_insert(error);
            }
            if let Some(error) = fatal {
                break Err(error);
            }
        };

        // cancel without the lock since the heartbeat task acquires it on
        // its way out
        cancel.cancel();
        if let Some(task) = heartbeats.take() {
            let _ = task.await;
        }

        result
    }

    /// Advertise `ver_*` counters and keep them fresh while intermittently
    /// looking for a Registration API in the background
    async fn peer_to_peer_operation(&mut self) -> Result<()> {
        info!("adopting peer-to-peer operation");

        let shared = Arc::clone(&self.shared);

        let (fallback, rediscovery_interval) = {
            let mut state = shared.lock();
            state.flags.registration_services_discovered = false;

            if let Err(error) = update_node_service_with_versions(
                self.advertiser.as_ref(),
                &state.settings,
                &self.ver,
            ) {
                warn!(%error, "node advertisement update failed");
            }

            (
                fallback_registration_service(&state.settings),
                state.settings.rediscovery_interval(),
            )
        };

        let cancel = CancellationToken::new();
        let discovery = tokio::spawn(background_discovery(
            Arc::clone(&shared),
            Arc::clone(&self.browser),
            fallback,
            rediscovery_interval,
            cancel.clone(),
        ));

        let mut last_seen = Tick(0);

        let result = loop {
            let grain_id = self.grain_id.clone();
            let seen = last_seen;
            let mut state = shared
                .wait_until(move |model| {
                    model.shutdown
                        || model.flags.registration_services_discovered
                        || model
                            .resources
                            .grain_updated(&grain_id)
                            .is_some_and(|updated| updated > seen)
                })
                .await;

            if state.shutdown || state.flags.registration_services_discovered {
                break Ok(());
            }

            let mut drain = match GrainDrain::take(&mut state.resources, &self.grain_id) {
                Ok(drain) => drain,
                Err(error) => break Err(error),
            };
            last_seen = state
                .resources
                .grain_updated(&self.grain_id)
                .unwrap_or(last_seen);

            // count the changes and republish the TXT records without the
            // lock on the model
            let settings = state.settings.clone();
            drop(state);

            let mut fatal = None;

            while let Some(event) = drain.pop_front() {
                match event.id_type() {
                    Ok((_, kind)) => self.ver.increment(kind),
                    Err(error) => {
                        fatal = Some(error);
                        break;
                    }
                }
            }

            if let Err(error) =
                update_node_service_with_versions(self.advertiser.as_ref(), &settings, &self.ver)
            {
                warn!(%error, "node advertisement update failed");
            }

            if let Some(error) = fatal {
                let mut state = shared.lock();
                if let Err(restore_error) = drain.restore(&mut state.resources) {
                    warn!(error = %restore_error, "grain restore failed");
                }
                break Err(error);
            }
        };

        // withdraw the ver_* records
        {
            let state = shared.lock();
            if let Err(error) = update_node_service(self.advertiser.as_ref(), &state.settings) {
                warn!(%error, "node advertisement update failed");
            }
        }

        // cancel without the lock since it is also used by the background
        // discovery
        cancel.cancel();
        let _ = discovery.await;

        result
    }

    /// Select the client for the current top registry, rebuilding it when
    /// the base URI changed; returns whether it was rebuilt
    fn select_client(
        &self,
        client: &mut Option<RegistrationClient>,
        base_uri: &str,
    ) -> Result<(RegistrationClient, bool)> {
        match client {
            Some(existing) if existing.base_uri() == base_uri => Ok((existing.clone(), false)),
            _ => {
                let fresh = RegistrationClient::new(
                    Arc::clone(&self.http),
                    Arc::clone(&self.downgrade),
                    base_uri,
                )?;
                *client = Some(fresh.clone());
                Ok((fresh, true))
            }
        }
    }
}

impl std::fmt::Debug for NodeBehaviour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeBehaviour")
            .field("grain_id", &self.grain_id)
            .field("self_id", &self.self_id)
            .field("discovery_backoff_secs", &self.discovery_backoff_secs)
            .finish_non_exhaustive()
    }
}

/// One exponential backoff step, clamped to `[min, max]`
fn next_discovery_backoff(current: f64, min: f64, max: f64, factor: f64) -> f64 {
    debug_assert!(min >= 0.0);
    debug_assert!(max >= min);
    debug_assert!(factor >= 1.0);

    (current * factor).max(min).min(max)
}
