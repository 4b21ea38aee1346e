// src/registry/workers.rs

use std::collections::BTreeMap;

use crate::registry::{NodeRef, RegistryEntry};
use crate::tree::PluginSpec;
use crate::types::{EventSet, ObservedEvent};

/// Ordered workers attached to one node for one event set.
#[derive(Debug, Clone)]
pub struct WorkerEntry {
    pub node: NodeRef,
    pub plugins: Vec<PluginSpec>,
    pub last_event: Option<ObservedEvent>,
}

impl RegistryEntry for WorkerEntry {
    fn node(&self) -> &NodeRef {
        &self.node
    }

    fn cached_event(&self) -> Option<&ObservedEvent> {
        self.last_event.as_ref()
    }

    fn carry_state_from(&mut self, previous: &Self) {
        if self.last_event.is_none() {
            self.last_event = previous.last_event.clone();
        }
    }
}

/// (node id, event set) -> workers. Never propagated past its job list.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    pub(crate) entries: BTreeMap<(String, EventSet), WorkerEntry>,
}

impl WorkerRegistry {
    pub fn insert(&mut self, node_id: impl Into<String>, events: EventSet, entry: WorkerEntry) {
        self.entries.insert((node_id.into(), events), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerEntry> {
        self.entries.values()
    }

    /// Worker entries of `node_id` reacting to `event`, in key order.
    pub fn for_event_mut<'a>(
        &'a mut self,
        node_id: &'a str,
        event: &'a str,
    ) -> impl Iterator<Item = &'a mut WorkerEntry> + 'a {
        self.entries
            .iter_mut()
            .filter(move |((id, set), _)| id == node_id && set.contains(event))
            .map(|(_, e)| e)
    }
}
