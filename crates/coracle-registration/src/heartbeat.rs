//! Background registration heartbeats
//!
//! While the node is in registered operation a background task persists it
//! in the registry by POSTing `/health/nodes/{id}` on a fixed interval. The
//! task terminates on a service error or when the registry has forgotten
//! the node, latching the matching flag under the model lock and notifying
//! the foreground loop. Cancellation is silent: someone else is in charge.

use crate::client::{RegistrationClient, RegistrationError};
use coracle_model::{Id, SharedModel};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

enum Terminal {
    ServiceError,
    NodeUnknown,
}

/// Run the heartbeat loop until a terminal condition or cancellation
pub async fn heartbeat_loop(
    shared: Arc<SharedModel>,
    client: RegistrationClient,
    node_id: Id,
    interval: Duration,
    cancel: CancellationToken,
) {
    let terminal = loop {
        let beat = async {
            tokio::time::sleep(interval).await;
            client.heartbeat(&node_id).await
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("heartbeat task cancelled");
                break None;
            }
            result = beat => match result {
                Ok(()) => continue,
                Err(RegistrationError::NodeUnknown) => break Some(Terminal::NodeUnknown),
                Err(RegistrationError::Service { .. }) => break Some(Terminal::ServiceError),
                Err(RegistrationError::Internal(error)) => {
                    // cannot arise from a heartbeat; treat as the registry
                    // misbehaving
                    error!(%error, "unexpected heartbeat failure");
                    break Some(Terminal::ServiceError);
                }
            }
        }
    };

    if let Some(terminal) = terminal {
        let mut state = shared.lock();
        match terminal {
            Terminal::ServiceError => state.flags.service_error = true,
            Terminal::NodeUnknown => state.flags.node_unregistered = true,
        }
        drop(state);
        shared.notify_all();
    }
}
