//! Registration API client
//!
//! A thin wrapper over the abstract HTTP client. One instance is bound to
//! one registry base URI (`{scheme}://{host}:{port}/x-nmos/registration/{version}`)
//! and is rebuilt whenever the selected registry changes.
//!
//! Status code expectations and error classification:
//! - `added`/`sync` → POST `/resource`, expect 201; a 200 means a stale
//!   record exists and is recovered by DELETE-then-retry-POST
//! - `modified` → POST `/resource`, expect 200
//! - `removed` → DELETE `/resource/{plural}/{id}`, expect 204
//! - heartbeat → POST `/health/nodes/{id}`, expect 200; 404 means the
//!   registry has forgotten the node
//! - 5xx, connect failure or timeout → fail over to the next registry
//! - other 4xx → log at error severity and keep going; the registry-held
//!   state may diverge and only the log shows it
//! - any other unexpected status → log at error severity, treat as success

use crate::downgrade::SchemaDowngrade;
use coracle_core::error::Error;
use coracle_core::http::{HttpClient, HttpError, HttpResponse};
use coracle_model::{ApiVersion, EventKind, Id, ResourceEvent, ResourceType};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::{debug, error, info, trace, warn};

/// Errors that drive the behaviour engine's mode transitions
#[derive(ThisError, Debug)]
pub enum RegistrationError {
    /// 5xx, inability to connect, or timeout: fail over to the next
    /// candidate registry
    #[error("registration service error: {reason}")]
    Service { reason: String },

    /// 404 on heartbeat: the node must re-register all of its resources
    #[error("node not known to the registration service")]
    NodeUnknown,

    /// Programmer error (malformed event, broken invariant); aborts the
    /// behaviour worker
    #[error(transparent)]
    Internal(#[from] Error),
}

impl RegistrationError {
    fn service(reason: impl Into<String>) -> Self {
        Self::Service {
            reason: reason.into(),
        }
    }
}

/// Result type for registration operations
pub type RegistrationResult<T> = std::result::Result<T, RegistrationError>;

/// Client for one Registration API
#[derive(Clone)]
pub struct RegistrationClient {
    http: Arc<dyn HttpClient>,
    downgrade: Arc<dyn SchemaDowngrade>,
    base_uri: String,
    registry_version: ApiVersion,
}

impl RegistrationClient {
    /// Bind a client to a registry base URI
    ///
    /// The registry version is parsed from the final path segment of the
    /// base URI.
    pub fn new(
        http: Arc<dyn HttpClient>,
        downgrade: Arc<dyn SchemaDowngrade>,
        base_uri: impl Into<String>,
    ) -> coracle_core::Result<Self> {
        let base_uri = base_uri.into();
        let base_uri = base_uri.trim_end_matches('/').to_string();

        let label = base_uri.rsplit('/').next().unwrap_or_default();
        let registry_version = ApiVersion::parse(label)?;

        Ok(Self {
            http,
            downgrade,
            base_uri,
            registry_version,
        })
    }

    /// The base URI this client is bound to
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// The IS-04 version the registry requested
    pub fn registry_version(&self) -> ApiVersion {
        self.registry_version
    }

    /// Build a `/resource` request body, downgrading the payload to the
    /// registry's version
    ///
    /// The wire protocol targets v1.2, so that is the source version handed
    /// to the downgrade.
    fn make_request_body(&self, kind: ResourceType, data: &Value) -> Value {
        json!({
            "type": kind.name(),
            "data": self
                .downgrade
                .downgrade(ApiVersion::V1_2, kind, data, self.registry_version),
        })
    }

    /// Translate one resource event into its Registration API request(s)
    ///
    /// Returns `Ok` on success and on ignored failures (4xx, unexpected
    /// status); the caller discards the event either way.
    pub async fn register_event(&self, event: &ResourceEvent) -> RegistrationResult<()> {
        let (id, kind) = event.id_type()?;

        match event.kind {
            EventKind::Added | EventKind::Sync => self.create(kind, &id, event).await,
            EventKind::Modified => self.update(kind, &id, event).await,
            EventKind::Removed => self.delete(kind, &id, event).await,
        }
    }

    async fn create(
        &self,
        kind: ResourceType,
        id: &Id,
        event: &ResourceEvent,
    ) -> RegistrationResult<()> {
        info!(%kind, %id, "requesting registration creation");

        let data = event_post_data(event)?;
        let body = self.make_request_body(kind, data);
        let response = self.post_resource(&body).await?;

        match response.status {
            201 => {
                debug!(%kind, %id, "registration created");
                Ok(())
            }
            200 => {
                // a previous record of the resource still exists; clear the
                // registry explicitly so it cannot stay out of sync
                warn!(%kind, %id, "registration out of sync");
                info!(%kind, %id, "requesting out of sync registration deletion");

                let deletion = self.delete_resource(&event.path).await?;
                if deletion.status == 204 {
                    debug!(%kind, %id, "registration deleted");
                } else {
                    self.handle_error_conditions(&deletion, "deletion")?;
                }

                info!(%kind, %id, "re-requesting registration creation");

                let retry = self.post_resource(&body).await?;
                if retry.status == 201 {
                    debug!(%kind, %id, "registration created");
                    Ok(())
                } else {
                    self.handle_error_conditions(&retry, "creation")
                }
            }
            _ => self.handle_error_conditions(&response, "creation"),
        }
    }

    async fn update(
        &self,
        kind: ResourceType,
        id: &Id,
        event: &ResourceEvent,
    ) -> RegistrationResult<()> {
        info!(%kind, %id, "requesting registration update");

        let data = event_post_data(event)?;
        let body = self.make_request_body(kind, data);
        let response = self.post_resource(&body).await?;

        if response.status == 200 {
            debug!(%kind, %id, "registration updated");
            Ok(())
        } else {
            self.handle_error_conditions(&response, "update")
        }
    }

    async fn delete(
        &self,
        kind: ResourceType,
        id: &Id,
        event: &ResourceEvent,
    ) -> RegistrationResult<()> {
        info!(%kind, %id, "requesting registration deletion");

        let response = self.delete_resource(&event.path).await?;

        if response.status == 204 {
            debug!(%kind, %id, "registration deleted");
            Ok(())
        } else {
            self.handle_error_conditions(&response, "deletion")
        }
    }

    /// Post a heartbeat for the registered node
    ///
    /// `Ok` means the registry still knows the node (including unexpected
    /// but non-404, non-5xx responses).
    pub async fn heartbeat(&self, node_id: &Id) -> RegistrationResult<()> {
        trace!(node = %node_id, "posting registration heartbeat");

        let url = format!("{}/health/nodes/{}", self.base_uri, node_id);
        let response = self.http.post(&url).await.map_err(map_http_error)?;

        match response.status {
            200 => Ok(()),
            404 => {
                // unexpected even though there is a recovery strategy
                error!(status = 404, "registration heartbeat error");
                Err(RegistrationError::NodeUnknown)
            }
            _ => self.handle_error_conditions(&response, "heartbeat"),
        }
    }

    async fn post_resource(&self, body: &Value) -> RegistrationResult<HttpResponse> {
        let url = format!("{}/resource", self.base_uri);
        self.http.post_json(&url, body).await.map_err(map_http_error)
    }

    async fn delete_resource(&self, event_path: &str) -> RegistrationResult<HttpResponse> {
        let url = format!("{}/resource/{}", self.base_uri, event_path);
        self.http.delete(&url).await.map_err(map_http_error)
    }

    /// Classify a response the caller did not expect
    ///
    /// 5xx raises a service error; 4xx is discarded after logging (the same
    /// request must not be re-attempted without corrective action, so the
    /// registry-held state is allowed to diverge); anything else is logged
    /// and treated as success.
    fn handle_error_conditions(
        &self,
        response: &HttpResponse,
        operation: &str,
    ) -> RegistrationResult<()> {
        if response.is_server_error() {
            error!(status = response.status, operation, "registration error");
            Err(RegistrationError::service(format!(
                "{} returned {}",
                operation, response.status
            )))
        } else if response.is_client_error() {
            error!(status = response.status, operation, "registration error");
            Ok(())
        } else {
            // a non-error status the caller did not expect
            error!(status = response.status, operation, "registration error");
            Ok(())
        }
    }
}

impl std::fmt::Debug for RegistrationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationClient")
            .field("base_uri", &self.base_uri)
            .field("registry_version", &self.registry_version)
            .finish_non_exhaustive()
    }
}

/// Transport failures and timeouts are service errors: the registry did not
/// respond correctly
fn map_http_error(error: HttpError) -> RegistrationError {
    error!(%error, "HTTP error");
    RegistrationError::service(error.to_string())
}

fn event_post_data(event: &ResourceEvent) -> RegistrationResult<&Value> {
    event.post.as_ref().ok_or_else(|| {
        RegistrationError::Internal(Error::malformed_grain_event(format!(
            "{:?} event for {} has no post payload",
            event.kind, event.path
        )))
    })
}
