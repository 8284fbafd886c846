//! The synthetic subscription and grain
//!
//! The engine tracks inventory changes through one synthetic subscription
//! naming one grain. Neither is exposed on the Node API; the grain's
//! `message.grain.data` array is the queue every store mutation appends to
//! and the synchroniser drains.
//!
//! Draining is take-then-restore: the drain steals the whole event array
//! under the model lock and hands unprocessed events back in front of any
//! new arrivals, so an early exit never loses events.

use crate::events::ResourceEvent;
use crate::resource::{ApiVersion, Id, Resource, ResourceType};
use crate::store::ResourceStore;
use coracle_core::error::Result;
use serde_json::{json, Value};
use std::collections::VecDeque;

/// Build the engine's synthetic subscription resource
///
/// The subscription watches everything: `resource_path` is empty and
/// `params` match all. It is non-persistent so nothing else may delete it.
pub fn make_grain_subscription(id: &Id) -> Resource {
    let data = json!({
        "id": id.as_str(),
        "max_update_rate_ms": 0,
        "persist": false,
        "resource_path": "",
        "params": {},
    });

    Resource::new(id.clone(), ResourceType::Subscription, ApiVersion::V1_2, data)
}

/// Build the grain resource receiving all inventory deltas
pub fn make_grain(id: &Id, subscription_id: &Id) -> Resource {
    let data = json!({
        "id": id.as_str(),
        "subscription_id": subscription_id.as_str(),
        "message": {
            "grain": {
                "topic": "/",
                "data": [],
            },
        },
    });

    Resource::new(id.clone(), ResourceType::Grain, ApiVersion::V1_2, data)
}

/// The grain's `message.grain.data` event array
pub(crate) fn grain_event_values_mut(data: &mut Value) -> Option<&mut Vec<Value>> {
    data.get_mut("message")?
        .get_mut("grain")?
        .get_mut("data")?
        .as_array_mut()
}

/// A drain over the grain's event queue
///
/// Constructed under the model lock; [`GrainDrain::restore`] must be called
/// (under the lock again) at the end of the drain scope. Restoring an empty
/// drain is a no-op.
#[derive(Debug)]
pub struct GrainDrain {
    grain_id: Id,
    events: VecDeque<ResourceEvent>,
}

impl GrainDrain {
    /// Steal all pending events from the grain, leaving its queue empty
    ///
    /// Bumps the grain's `updated` stamp.
    pub fn take(store: &mut ResourceStore, grain_id: &Id) -> Result<Self> {
        let events = store.take_grain_events(grain_id)?;

        Ok(Self {
            grain_id: grain_id.clone(),
            events: events.into(),
        })
    }

    /// The event at the front of the drain, if any
    pub fn front(&self) -> Option<&ResourceEvent> {
        self.events.front()
    }

    /// Discard and return the event at the front of the drain
    pub fn pop_front(&mut self) -> Option<ResourceEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consume all remaining events without processing them
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Return unprocessed events to the front of the grain queue
    ///
    /// Events that arrived in the grain while the drain was held follow the
    /// restored ones, preserving store production order. Bumps the grain's
    /// `updated` stamp iff anything was restored.
    pub fn restore(self, store: &mut ResourceStore) -> Result<()> {
        if self.events.is_empty() {
            return Ok(());
        }

        store.restore_grain_events(&self.grain_id, self.events.into())
    }
}
