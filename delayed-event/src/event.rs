//! Event occurrence records delivered by the event source.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::element::ElementId;

/// One occurrence of an event on an element.
///
/// The engine never interprets `attributes`; it only buffers records in
/// arrival order and forwards them to the binding's callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: CompactString,
    pub target: ElementId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<CompactString, serde_json::Value>,
}

impl EventRecord {
    /// Record stamped with the current wall-clock time.
    pub fn new(event_type: impl Into<CompactString>, target: ElementId) -> Self {
        Self {
            event_type: event_type.into(),
            target,
            timestamp: Utc::now(),
            attributes: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a source-provided attribute (key code, modifiers, ...).
    #[must_use]
    pub fn with_attr(
        mut self,
        key: impl Into<CompactString>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}
