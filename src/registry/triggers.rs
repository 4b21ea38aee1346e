// src/registry/triggers.rs

use std::collections::BTreeMap;

use crate::registry::{NodeRef, RegistryEntry};
use crate::tree::NodePath;
use crate::types::{EventSet, ObservedEvent};

/// A tree-event trigger owned by `node`, watching the node named `source`.
#[derive(Debug, Clone)]
pub struct TriggerEntry {
    pub node: NodeRef,
    pub source: String,
    /// Last event that fired this trigger.
    pub last_event: Option<ObservedEvent>,
}

impl RegistryEntry for TriggerEntry {
    fn node(&self) -> &NodeRef {
        &self.node
    }

    fn cached_event(&self) -> Option<&ObservedEvent> {
        self.last_event.as_ref()
    }

    fn carry_state_from(&mut self, previous: &Self) {
        if self.last_event.is_none() && previous.source == self.source {
            self.last_event = previous.last_event.clone();
        }
    }
}

/// event-name-set -> (owner path -> trigger).
#[derive(Debug, Clone, Default)]
pub struct EventTriggerRegistry {
    pub(crate) by_events: BTreeMap<EventSet, BTreeMap<NodePath, TriggerEntry>>,
}

impl EventTriggerRegistry {
    pub fn insert(&mut self, events: EventSet, entry: TriggerEntry) {
        self.by_events
            .entry(events)
            .or_default()
            .insert(entry.node.path.clone(), entry);
    }

    pub fn get(&self, events: &EventSet, owner: &NodePath) -> Option<&TriggerEntry> {
        self.by_events.get(events)?.get(owner)
    }

    pub fn len(&self) -> usize {
        self.by_events.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EventSet, &TriggerEntry)> {
        self.by_events
            .iter()
            .flat_map(|(set, m)| m.values().map(move |e| (set, e)))
    }

    /// Triggers whose event set contains `event`.
    pub fn listening_mut(&mut self, event: &str) -> impl Iterator<Item = &mut TriggerEntry> {
        self.by_events
            .iter_mut()
            .filter(move |(set, _)| set.contains(event))
            .flat_map(|(_, m)| m.values_mut())
    }
}
