//! Resource change events
//!
//! Every store mutation of a public resource is mirrored as an event into
//! the engine's grain. The event carries the `{plural}/{id}` path of the
//! resource, the kind of change, and the JSON payloads either side of it.

use crate::resource::{Id, ResourceType};
use coracle_core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of change a resource event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Resource inserted into the store
    Added,
    /// Resource payload changed
    Modified,
    /// Resource removed from the store
    Removed,
    /// Snapshot replay of a resource already in the store
    Sync,
}

impl EventKind {
    /// Added and sync events both call for registration creation
    pub fn is_creation(&self) -> bool {
        matches!(self, Self::Added | Self::Sync)
    }
}

/// A single resource change observed through the engine's subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// `"{resource_type_plural}/{id}"`, e.g. `"devices/6a1c…"`
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Payload before the change; absent for added/sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<Value>,
    /// Payload after the change; absent for removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Value>,
}

impl ResourceEvent {
    /// Format the event path for a resource
    pub fn event_path(kind: ResourceType, id: &Id) -> String {
        format!("{}/{}", kind.plural(), id)
    }

    /// Event for a resource inserted into the store
    pub fn added(kind: ResourceType, id: &Id, post: Value) -> Self {
        Self {
            path: Self::event_path(kind, id),
            kind: EventKind::Added,
            pre: None,
            post: Some(post),
        }
    }

    /// Event for a resource payload change
    pub fn modified(kind: ResourceType, id: &Id, pre: Value, post: Value) -> Self {
        Self {
            path: Self::event_path(kind, id),
            kind: EventKind::Modified,
            pre: Some(pre),
            post: Some(post),
        }
    }

    /// Event for a resource removed from the store
    pub fn removed(kind: ResourceType, id: &Id, pre: Value) -> Self {
        Self {
            path: Self::event_path(kind, id),
            kind: EventKind::Removed,
            pre: Some(pre),
            post: None,
        }
    }

    /// Snapshot event for a resource already in the store
    pub fn sync(kind: ResourceType, id: &Id, post: Value) -> Self {
        Self {
            path: Self::event_path(kind, id),
            kind: EventKind::Sync,
            pre: None,
            post: Some(post),
        }
    }

    /// Split the event path back into the resource id and type
    ///
    /// # Errors
    /// Returns error on a path without a slash or with an unknown plural
    /// form; both are programmer errors in the store.
    pub fn id_type(&self) -> Result<(Id, ResourceType)> {
        let (plural, id) = self
            .path
            .split_once('/')
            .ok_or_else(|| Error::invalid_event_path(&self.path))?;

        let kind = ResourceType::from_plural(plural)?;
        let id = Id::new(id)?;

        Ok((id, kind))
    }
}
