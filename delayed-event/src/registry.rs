//! Engine-owned element registry: element identity -> its bindings.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{binding::BindingState, element::ElementId};

pub(crate) type SharedBinding = Arc<Mutex<BindingState>>;
pub(crate) type BindingList = SmallVec<[SharedBinding; 2]>;

/// Bindings per element, in bind order.
#[derive(Default)]
pub(crate) struct BindingRegistry {
    elements: AHashMap<ElementId, BindingList>,
}

impl BindingRegistry {
    /// Append a binding, creating the element entry on first use.
    pub fn attach(&mut self, element: ElementId, binding: SharedBinding) {
        self.elements.entry(element).or_default().push(binding);
    }

    pub fn bindings(&self, element: &ElementId) -> BindingList {
        self.elements.get(element).cloned().unwrap_or_default()
    }

    /// Bindings on `element` listening for `event_type`.
    pub fn listeners(&self, element: &ElementId, event_type: &str) -> BindingList {
        self.elements
            .get(element)
            .map(|list| {
                list.iter()
                    .filter(|b| b.lock().event_type == event_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove the bindings for `event_type` (all when `None`). The element
    /// entry stays registered.
    pub fn detach(&mut self, element: &ElementId, event_type: Option<&str>) -> BindingList {
        let Some(list) = self.elements.get_mut(element) else {
            return BindingList::new();
        };

        let (removed, kept): (BindingList, BindingList) = list
            .drain(..)
            .partition(|b| event_type.is_none_or(|ty| b.lock().event_type == ty));
        *list = kept;
        removed
    }

    /// Drop the element entirely.
    pub fn remove(&mut self, element: &ElementId) -> BindingList {
        self.elements.remove(element).unwrap_or_default()
    }

    pub fn contains(&self, element: &ElementId) -> bool {
        self.elements.contains_key(element)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}
