//! Observer registry for queue events.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;

/// Event types a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// An entry moved into the admitted sequence.
    Enqueue,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enqueue" => Ok(Self::Enqueue),
            other => Err(QueueError::UnknownEvent(other.to_string())),
        }
    }
}

/// Opaque identifier returned when a listener is registered.
///
/// Hex millisecond timestamp followed by a random v4 UUID, unique for the
/// lifetime of the process in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(String);

impl ListenerId {
    pub(crate) fn generate() -> Self {
        Self(format!(
            "{:x}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Callback invoked with the admitted entry.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Listeners grouped by event type, each group kept in registration order.
pub(crate) struct ListenerRegistry<T> {
    by_kind: IndexMap<EventKind, IndexMap<ListenerId, Listener<T>>>,
}

impl<T> ListenerRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            by_kind: IndexMap::new(),
        }
    }

    pub(crate) fn add(&mut self, kind: EventKind, listener: Listener<T>) -> ListenerId {
        let id = ListenerId::generate();
        self.by_kind
            .entry(kind)
            .or_default()
            .insert(id.clone(), listener);
        id
    }

    /// Unknown ids are ignored; returns whether something was removed.
    pub(crate) fn remove(&mut self, kind: EventKind, id: &ListenerId) -> bool {
        self.by_kind
            .get_mut(&kind)
            .and_then(|group| group.shift_remove(id))
            .is_some()
    }

    pub(crate) fn len(&self, kind: EventKind) -> usize {
        self.by_kind.get(&kind).map_or(0, |group| group.len())
    }

    /// Clone the current listeners so they can be invoked without holding
    /// the queue lock.
    pub(crate) fn snapshot(&self, kind: EventKind) -> Vec<Listener<T>> {
        self.by_kind
            .get(&kind)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Invoke every listener with `entry`. A panicking listener is logged and
/// skipped; the rest still run.
pub(crate) fn notify<T>(kind: EventKind, listeners: &[Listener<T>], entry: &T) {
    for (index, listener) in listeners.iter().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| listener(entry))).is_err() {
            tracing::warn!(event = %kind, listener = index, "listener panicked");
        }
    }
}
