//! Dirty-node bookkeeping
//!
//! Collected while a draft is open and handed to the reconciler on commit.
//! Leaves and elements are tracked apart because the reconciler treats them
//! differently: a dirty leaf is patched in place, a dirty element may need its
//! child list diffed.

use crate::NodeKey;
use std::collections::{HashMap, HashSet};

/// How much of an element needs reconciling. Ordered by severity; marking
/// never downgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementDirt {
    /// Only a descendant changed: walk into the children, but the element's
    /// own fields and child list are untouched.
    Ancestor,
    /// The element itself (fields or child list) changed.
    Changed,
    /// Rebuild from scratch. Only meaningful on the root.
    Full,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirtySet {
    leaves: HashSet<NodeKey>,
    elements: HashMap<NodeKey, ElementDirt>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dirty set that asks for a full rebuild of the presentation.
    pub fn full() -> Self {
        let mut dirty = Self::new();
        dirty.mark_full_reconcile();
        dirty
    }

    pub fn mark_leaf(&mut self, key: NodeKey) {
        self.leaves.insert(key);
    }

    pub fn mark_element(&mut self, key: NodeKey, dirt: ElementDirt) {
        let entry = self.elements.entry(key).or_insert(dirt);
        if *entry < dirt {
            *entry = dirt;
        }
    }

    pub fn mark_full_reconcile(&mut self) {
        self.mark_element(NodeKey::root(), ElementDirt::Full);
    }

    pub fn is_full_reconcile(&self) -> bool {
        self.elements.get(&NodeKey::root()) == Some(&ElementDirt::Full)
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.leaves.len() + self.elements.len()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.leaves.contains(key) || self.elements.contains_key(key)
    }

    pub fn is_leaf_dirty(&self, key: &NodeKey) -> bool {
        self.leaves.contains(key)
    }

    pub fn element(&self, key: &NodeKey) -> Option<ElementDirt> {
        self.elements.get(key).copied()
    }

    /// Dirty in its own right, not merely as the ancestor of a change.
    pub fn is_intentionally_dirty(&self, key: &NodeKey) -> bool {
        self.leaves.contains(key)
            || self
                .elements
                .get(key)
                .is_some_and(|dirt| *dirt >= ElementDirt::Changed)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &NodeKey> {
        self.leaves.iter()
    }

    pub fn elements(&self) -> impl Iterator<Item = (&NodeKey, ElementDirt)> {
        self.elements.iter().map(|(key, dirt)| (key, *dirt))
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.leaves.iter().chain(self.elements.keys())
    }

    pub fn extend(&mut self, other: &DirtySet) {
        self.leaves.extend(other.leaves.iter().cloned());
        for (key, dirt) in other.elements() {
            self.mark_element(key.clone(), dirt);
        }
    }

    pub fn remove(&mut self, key: &NodeKey) {
        self.leaves.remove(key);
        self.elements.remove(key);
    }

    pub fn clear(&mut self) {
        self.leaves.clear();
        self.elements.clear();
    }
}
