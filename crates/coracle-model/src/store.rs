//! The resource store
//!
//! TigerStyle: Explicit mutation methods, strictly increasing update stamps.
//!
//! An indexed collection of resources. Every mutation advances a
//! process-wide counter used as the `updated` stamp, and every mutation of
//! a public resource is mirrored as a [`ResourceEvent`] into the installed
//! grain. The grain is re-looked-up by id on each append; the store never
//! holds a pointer into itself.

use crate::events::ResourceEvent;
use crate::grain::grain_event_values_mut;
use crate::resource::{Id, Resource, ResourceType, Tick};
use coracle_core::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;

/// The node's local resource inventory
#[derive(Debug, Default)]
pub struct ResourceStore {
    resources: HashMap<Id, Resource>,
    /// Insertion order, for deterministic snapshots
    order: Vec<Id>,
    /// Process-wide strictly increasing update counter
    update_counter: u64,
    /// Grain receiving events for every public mutation
    grain_id: Option<Id>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the update stamp
    ///
    /// Strictly increasing across all mutations of this store.
    fn strictly_increasing_update(&mut self) -> Tick {
        self.update_counter += 1;
        Tick(self.update_counter)
    }

    /// Install the grain that receives resource events
    ///
    /// The grain resource itself must already be in the store.
    pub fn install_grain(&mut self, grain_id: Id) {
        debug_assert!(self.resources.contains_key(&grain_id));
        self.grain_id = Some(grain_id);
    }

    /// Insert a resource, stamping it and mirroring an `added` event
    pub fn insert(&mut self, mut resource: Resource) -> Result<()> {
        if self.resources.contains_key(&resource.id) {
            return Err(Error::ResourceAlreadyExists {
                id: resource.id.to_string(),
            });
        }

        resource.updated = self.strictly_increasing_update();

        let event = resource.kind.is_public().then(|| {
            ResourceEvent::added(resource.kind, &resource.id, resource.data.clone())
        });

        self.order.push(resource.id.clone());
        self.resources.insert(resource.id.clone(), resource);

        if let Some(event) = event {
            self.append_grain_event(event)?;
        }

        Ok(())
    }

    /// Find a resource by id
    pub fn find(&self, id: &Id) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Modify a resource in place, stamping it and mirroring a `modified`
    /// event
    pub fn modify<F>(&mut self, id: &Id, f: F) -> Result<()>
    where
        F: FnOnce(&mut Resource),
    {
        let tick = self.strictly_increasing_update();

        let resource = self
            .resources
            .get_mut(id)
            .ok_or_else(|| Error::resource_not_found(id.as_str()))?;

        let pre = resource.data.clone();
        f(resource);
        resource.updated = tick;

        let event = resource.kind.is_public().then(|| {
            ResourceEvent::modified(resource.kind, id, pre, resource.data.clone())
        });

        if let Some(event) = event {
            self.append_grain_event(event)?;
        }

        Ok(())
    }

    /// Remove a resource, mirroring a `removed` event
    pub fn remove(&mut self, id: &Id) -> Result<()> {
        let resource = self
            .resources
            .remove(id)
            .ok_or_else(|| Error::resource_not_found(id.as_str()))?;

        self.order.retain(|ordered| ordered != id);

        if resource.kind.is_public() {
            let event = ResourceEvent::removed(resource.kind, id, resource.data);
            self.append_grain_event(event)?;
        }

        Ok(())
    }

    /// The installed grain's current `updated` stamp
    ///
    /// The engine's wait predicates poll this through the lock.
    pub fn grain_updated(&self, grain_id: &Id) -> Option<Tick> {
        self.resources.get(grain_id).map(|grain| grain.updated)
    }

    /// Append an event to the installed grain and bump its stamp
    fn append_grain_event(&mut self, event: ResourceEvent) -> Result<()> {
        let Some(grain_id) = self.grain_id.clone() else {
            return Ok(());
        };

        let tick = self.strictly_increasing_update();

        // re-lookup by id; the grain may have been removed
        let Some(grain) = self.resources.get_mut(&grain_id) else {
            return Ok(());
        };

        let value = serde_json::to_value(&event).map_err(|e| Error::SerializationFailed {
            reason: e.to_string(),
        })?;

        let events = grain_event_values_mut(&mut grain.data)
            .ok_or_else(|| Error::malformed_grain_event("grain has no message.grain.data"))?;

        events.push(value);
        grain.updated = tick;

        Ok(())
    }

    /// Steal the grain's event array, leaving it empty
    ///
    /// Bumps the grain's `updated` stamp. Use through
    /// [`crate::grain::GrainDrain`].
    pub fn take_grain_events(&mut self, grain_id: &Id) -> Result<Vec<ResourceEvent>> {
        let tick = self.strictly_increasing_update();

        let grain = self
            .resources
            .get_mut(grain_id)
            .ok_or_else(|| Error::resource_not_found(grain_id.as_str()))?;

        let values = grain_event_values_mut(&mut grain.data)
            .ok_or_else(|| Error::malformed_grain_event("grain has no message.grain.data"))?;

        let taken = std::mem::take(values);
        grain.updated = tick;

        taken
            .into_iter()
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| Error::malformed_grain_event(e.to_string()))
            })
            .collect()
    }

    /// Re-prepend unprocessed events ahead of any newer arrivals
    ///
    /// Bumps the grain's `updated` stamp so a waiting synchroniser retries.
    pub fn restore_grain_events(
        &mut self,
        grain_id: &Id,
        events: Vec<ResourceEvent>,
    ) -> Result<()> {
        let tick = self.strictly_increasing_update();

        let grain = self
            .resources
            .get_mut(grain_id)
            .ok_or_else(|| Error::resource_not_found(grain_id.as_str()))?;

        let values = grain_event_values_mut(&mut grain.data)
            .ok_or_else(|| Error::malformed_grain_event("grain has no message.grain.data"))?;

        let mut restored = events
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::SerializationFailed {
                reason: e.to_string(),
            })?;

        restored.append(values);
        *values = restored;
        grain.updated = tick;

        Ok(())
    }

    /// Replace the grain's event array with a fresh snapshot of the store
    ///
    /// Bumps the grain's `updated` stamp.
    pub fn reset_grain_events(
        &mut self,
        grain_id: &Id,
        events: Vec<ResourceEvent>,
    ) -> Result<()> {
        let tick = self.strictly_increasing_update();

        let grain = self
            .resources
            .get_mut(grain_id)
            .ok_or_else(|| Error::resource_not_found(grain_id.as_str()))?;

        let values = grain_event_values_mut(&mut grain.data)
            .ok_or_else(|| Error::malformed_grain_event("grain has no message.grain.data"))?;

        *values = events
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::SerializationFailed {
                reason: e.to_string(),
            })?;
        grain.updated = tick;

        Ok(())
    }

    /// Full snapshot of the store as `sync` events
    ///
    /// The node resource comes first so replaying the snapshot registers it
    /// before any sub-resource; remaining public resources follow in
    /// insertion order. `resource_path` narrows the snapshot to one plural
    /// collection (empty matches everything); `params` fields must match the
    /// resource payload exactly.
    pub fn make_resource_events(&self, resource_path: &str, params: &Value) -> Vec<ResourceEvent> {
        let matches = |resource: &Resource| {
            if !resource.kind.is_public() {
                return false;
            }

            if !resource_path.is_empty()
                && resource_path.trim_start_matches('/') != resource.kind.plural()
            {
                return false;
            }

            match params.as_object() {
                Some(fields) => fields
                    .iter()
                    .all(|(key, expected)| resource.data.get(key) == Some(expected)),
                None => true,
            }
        };

        let snapshot = |resource: &Resource| {
            ResourceEvent::sync(resource.kind, &resource.id, resource.data.clone())
        };

        let ordered = self.order.iter().filter_map(|id| self.resources.get(id));

        let mut events: Vec<ResourceEvent> = ordered
            .clone()
            .filter(|r| r.kind == ResourceType::Node)
            .filter(|r| matches(r))
            .map(snapshot)
            .collect();

        events.extend(
            ordered
                .filter(|r| r.kind != ResourceType::Node)
                .filter(|r| matches(r))
                .map(snapshot),
        );

        events
    }
}
