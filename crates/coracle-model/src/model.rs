//! Shared model state and the engine's condition-variable discipline
//!
//! TigerStyle: One lock, one condition variable, explicit suspension points.
//!
//! The resource store, the settings, the candidate registry list and the
//! behaviour flags all live under a single mutex. A single [`Notify`] is
//! signalled on every store mutation and every flag change; all waiters use
//! predicates re-checked under the lock, so wakeups can be spurious but
//! never lost.
//!
//! Guards are synchronous (`parking_lot`) and must never be held across an
//! await; [`SharedModel::unlocked`] is the explicit release-reacquire scope
//! for blocking HTTP requests issued mid-drain.

use crate::services::RegistrationServices;
use crate::store::ResourceStore;
use coracle_core::settings::Settings;
use parking_lot::{Mutex, MutexGuard};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Notify;

/// Flags exchanged between the behaviour phases and their background tasks
///
/// Written only under the model lock; every write is followed by a notify.
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviourFlags {
    /// The selected registration service returned a 5xx, failed to connect
    /// or timed out; the engine must fail over
    pub service_error: bool,
    /// The node resource was accepted by the registry
    pub node_registered: bool,
    /// The registry no longer knows the node (404 on heartbeat) or the node
    /// deleted itself
    pub node_unregistered: bool,
    /// The background rediscovery found registration services while the
    /// engine was in peer-to-peer operation
    pub registration_services_discovered: bool,
}

/// Everything the single model mutex protects
#[derive(Debug)]
pub struct NodeModel {
    pub resources: ResourceStore,
    pub settings: Settings,
    pub registration_services: RegistrationServices,
    pub flags: BehaviourFlags,
    pub shutdown: bool,
}

impl NodeModel {
    pub fn new(settings: Settings) -> Self {
        Self {
            resources: ResourceStore::new(),
            settings,
            registration_services: RegistrationServices::new(),
            flags: BehaviourFlags::default(),
            shutdown: false,
        }
    }
}

/// The shared model: one mutex, one condition variable
pub struct SharedModel {
    state: Mutex<NodeModel>,
    notify: Notify,
}

impl SharedModel {
    pub fn new(settings: Settings) -> Self {
        Self {
            state: Mutex::new(NodeModel::new(settings)),
            notify: Notify::new(),
        }
    }

    /// Acquire the model lock
    pub fn lock(&self) -> MutexGuard<'_, NodeModel> {
        self.state.lock()
    }

    /// Wake every waiter; call after any mutation or flag change
    pub fn notify_all(&self) {
        self.notify.notify_waiters();
    }

    /// Request engine shutdown
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.notify_all();
    }

    /// Mutate the model under the lock, then notify all waiters
    ///
    /// The embedding process mutates the store through this so the engine
    /// observes every change.
    pub fn with_write<T>(&self, f: impl FnOnce(&mut NodeModel) -> T) -> T {
        let mut guard = self.state.lock();
        let value = f(&mut guard);
        drop(guard);
        self.notify_all();
        value
    }

    /// Wait until the predicate holds, returning the guard it held under
    ///
    /// The waiter is registered before the predicate is checked, so a
    /// notification between the check and the suspension cannot be lost.
    pub async fn wait_until<F>(&self, mut predicate: F) -> MutexGuard<'_, NodeModel>
    where
        F: FnMut(&NodeModel) -> bool,
    {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let guard = self.state.lock();
                if predicate(&guard) {
                    return guard;
                }
            }

            notified.await;
        }
    }

    /// Wait until the predicate holds or the timeout elapses
    ///
    /// On timeout the lock is re-acquired and returned with the predicate
    /// possibly still false; callers re-check what they care about.
    pub async fn wait_for_until<F>(
        &self,
        timeout: Duration,
        predicate: F,
    ) -> MutexGuard<'_, NodeModel>
    where
        F: FnMut(&NodeModel) -> bool,
    {
        match tokio::time::timeout(timeout, self.wait_until(predicate)).await {
            Ok(guard) => guard,
            Err(_) => self.state.lock(),
        }
    }

    /// Run a future with the model lock released, re-acquiring on completion
    ///
    /// The inverse-lock scope for blocking requests issued while draining:
    /// release on entry, re-acquire on exit.
    pub async fn unlocked<'a, T, Fut>(
        &'a self,
        guard: MutexGuard<'a, NodeModel>,
        fut: Fut,
    ) -> (MutexGuard<'a, NodeModel>, T)
    where
        Fut: Future<Output = T>,
    {
        drop(guard);
        let value = fut.await;
        (self.state.lock(), value)
    }
}

impl std::fmt::Debug for SharedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedModel").finish_non_exhaustive()
    }
}
