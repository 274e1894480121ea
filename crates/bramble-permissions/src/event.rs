//! Event identifiers and the per-event permission-usage mapping
//!
//! Every inbound event gets its own [`EventId`] at ingress. While an event is
//! being resolved, the [`EventPermissionTracker`] records which
//! `(entity, node)` pairs were consulted; end-of-event cleanup drains that
//! record and drops exactly the matching memoized results. IDs are random
//! UUIDs rather than anything derived from the event object itself, so a
//! recycled allocation can never alias a live mapping entry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

/// Process-unique identifier for one inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(Uuid);

impl EventId {
    /// Allocate a fresh id; called once per event at ingress
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// The `(entity, node)` pairs one event's resolution touched
#[derive(Debug, Default)]
pub(crate) struct EventTouches {
    pub(crate) users: HashSet<(String, String)>,
    pub(crate) groups: HashSet<(String, String)>,
}

/// Mapping from in-flight events to the permission checks they performed.
///
/// Entries are created on the first check an event performs and consumed
/// exactly once when the event finishes processing. Abandoned events leave
/// orphaned entries behind; those are observable through [`Self::tracked_events`]
/// but reclaimed only on a later drain for the same id.
pub struct EventPermissionTracker {
    events: Mutex<HashMap<EventId, EventTouches>>,
}

impl EventPermissionTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
        }
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, HashMap<EventId, EventTouches>> {
        // Recording usage must never panic the event pipeline, so a poisoned
        // map is adopted as-is.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record every entity a check for `node` consulted while resolving
    /// `event`
    pub fn record(
        &self,
        event: EventId,
        user_id: Option<&str>,
        group_id: Option<&str>,
        node: &str,
    ) {
        if let Some(user_id) = user_id {
            self.record_user(event, user_id, node);
        }
        if let Some(group_id) = group_id {
            self.record_group(event, group_id, node);
        }
    }

    /// Record that a user check for `node` ran while resolving `event`
    pub fn record_user(&self, event: EventId, user_id: &str, node: &str) {
        self.lock_events()
            .entry(event)
            .or_default()
            .users
            .insert((user_id.to_string(), node.to_string()));
    }

    /// Record that a group check for `node` ran while resolving `event`
    pub fn record_group(&self, event: EventId, group_id: &str, node: &str) {
        self.lock_events()
            .entry(event)
            .or_default()
            .groups
            .insert((group_id.to_string(), node.to_string()));
    }

    /// Remove and return everything recorded for an event; `None` when the
    /// event was never tracked or was already drained
    pub(crate) fn drain(&self, event: EventId) -> Option<EventTouches> {
        self.lock_events().remove(&event)
    }

    /// Whether the event currently has a mapping entry
    pub fn contains(&self, event: EventId) -> bool {
        self.lock_events().contains_key(&event)
    }

    /// Number of events with live mapping entries
    pub fn tracked_events(&self) -> usize {
        self.lock_events().len()
    }
}

impl Default for EventPermissionTracker {
    fn default() -> Self {
        Self::new()
    }
}
