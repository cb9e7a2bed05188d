//! Element identities and the element collections operations act on.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Opaque identity of a target element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl ElementId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ElementId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Ordered collection of target elements.
///
/// Every engine operation takes one of these and hands it back unchanged, so
/// calls can be chained the way a selection is chained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSet {
    items: SmallVec<[ElementId; 4]>,
}

impl ElementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection holding exactly one element.
    pub fn single(id: ElementId) -> Self {
        let mut items = SmallVec::new();
        items.push(id);
        Self { items }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementId> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[ElementId] {
        &self.items
    }
}

impl From<ElementId> for ElementSet {
    fn from(id: ElementId) -> Self {
        Self::single(id)
    }
}

impl FromIterator<ElementId> for ElementSet {
    fn from_iter<I: IntoIterator<Item = ElementId>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ElementSet {
    type Item = &'a ElementId;
    type IntoIter = std::slice::Iter<'a, ElementId>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
