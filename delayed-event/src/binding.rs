//! Per-binding debounce state.
//!
//! One [`BindingState`] exists per (element, event type, bind call). It is
//! either Idle (empty buffer, no timer) or Accumulating (buffered events and
//! exactly one pending flush).

use std::{fmt, sync::Arc, time::Duration};

use compact_str::CompactString;
use serde::Serialize;

use crate::{element::ElementId, event::EventRecord, timer::TimerHandle};

/// Flush callback: receives the element (the call's subject) and the batch.
pub type BatchCallback = Arc<dyn Fn(&ElementId, Vec<EventRecord>) + Send + Sync + 'static>;

/// Identity of one bind call on one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BindingId(pub(crate) u64);

impl BindingId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingPhase {
    Idle,
    Accumulating,
}

/// The flush currently scheduled for a binding.
///
/// `ticket` is what the timer task carries; a task whose ticket no longer
/// matches was superseded and must not flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingFlush {
    pub ticket: u64,
    pub timer: TimerHandle,
}

pub(crate) struct BindingState {
    pub id: BindingId,
    pub element: ElementId,
    pub event_type: CompactString,
    pub delay: Duration,
    pub callback: BatchCallback,
    pub pending: Option<PendingFlush>,
    pub buffer: Vec<EventRecord>,
    next_ticket: u64,
}

impl BindingState {
    pub fn new(
        id: BindingId,
        element: ElementId,
        event_type: CompactString,
        delay: Duration,
        callback: BatchCallback,
    ) -> Self {
        Self {
            id,
            element,
            event_type,
            delay,
            callback,
            pending: None,
            buffer: Vec::new(),
            next_ticket: 0,
        }
    }

    pub fn phase(&self) -> BindingPhase {
        if self.pending.is_some() {
            BindingPhase::Accumulating
        } else {
            BindingPhase::Idle
        }
    }

    pub fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Take the batch if `ticket` is still the live flush.
    pub fn take_batch(&mut self, ticket: u64) -> Option<Vec<EventRecord>> {
        match self.pending {
            Some(p) if p.ticket == ticket => {
                self.pending = None;
                Some(std::mem::take(&mut self.buffer))
            }
            _ => None,
        }
    }

    /// Back to Idle without flushing. Returns the timer that was pending.
    pub fn reset(&mut self) -> Option<TimerHandle> {
        self.buffer.clear();
        self.pending.take().map(|p| p.timer)
    }

    pub fn snapshot(&self) -> BindingSnapshot {
        BindingSnapshot {
            id: self.id,
            element: self.element,
            event_type: self.event_type.clone(),
            delay: self.delay,
            phase: self.phase(),
            buffered: self.buffer.len(),
        }
    }
}

impl fmt::Debug for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingState")
            .field("id", &self.id)
            .field("element", &self.element)
            .field("event_type", &self.event_type)
            .field("delay", &self.delay)
            .field("pending", &self.pending)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

/// Read-only view of one binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingSnapshot {
    pub id: BindingId,
    pub element: ElementId,
    pub event_type: CompactString,
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    pub phase: BindingPhase,
    pub buffered: usize,
}
