//! Node arena
//!
//! A [`NodeMap`] is a flat `key → node` map. Nodes are held behind [`Arc`] so
//! a pending draft shares every untouched node with the frozen state it was
//! spawned from; [`NodeMap::make_mut`] clones a node the first time it is
//! written to.

use crate::{ModelError, ModelResult, Node, NodeKey};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct NodeMap {
    nodes: HashMap<NodeKey, Arc<Node>>,
}

impl NodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key).map(Arc::as_ref)
    }

    pub fn get_arc(&self, key: &NodeKey) -> Option<&Arc<Node>> {
        self.nodes.get(key)
    }

    /// Like [`NodeMap::get`] but fails with `NodeNotFound`.
    pub fn node(&self, key: &NodeKey) -> ModelResult<&Node> {
        self.get(key).ok_or_else(|| ModelError::not_found(key))
    }

    pub fn root(&self) -> Option<&Node> {
        self.get(&NodeKey::root())
    }

    pub fn insert(&mut self, node: Node) -> Option<Arc<Node>> {
        self.nodes.insert(node.key.clone(), Arc::new(node))
    }

    pub fn insert_arc(&mut self, node: Arc<Node>) -> Option<Arc<Node>> {
        self.nodes.insert(node.key.clone(), node)
    }

    pub fn remove(&mut self, key: &NodeKey) -> Option<Arc<Node>> {
        self.nodes.remove(key)
    }

    /// Copy-on-write access: clones the node if it is still shared with
    /// another map.
    pub fn make_mut(&mut self, key: &NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key).map(Arc::make_mut)
    }

    /// Whether this map and `other` hold the very same node allocation for `key`.
    pub fn shares(&self, other: &NodeMap, key: &NodeKey) -> bool {
        match (self.nodes.get(key), other.nodes.get(key)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeKey, &Node)> {
        self.nodes.iter().map(|(key, node)| (key, node.as_ref()))
    }

    pub fn parent_of(&self, key: &NodeKey) -> Option<&Node> {
        self.get(key)
            .and_then(|node| node.parent.as_ref())
            .and_then(|parent| self.get(parent))
    }

    pub fn children(&self, key: &NodeKey) -> &[NodeKey] {
        self.get(key).map(Node::children).unwrap_or(&[])
    }

    /// Parent keys from the direct parent up to the root.
    pub fn ancestors(&self, key: &NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut current = self.get(key).and_then(|node| node.parent.clone());
        while let Some(parent) = current {
            if out.len() > self.nodes.len() {
                break;
            }
            current = self.get(&parent).and_then(|node| node.parent.clone());
            out.push(parent);
        }
        out
    }

    pub fn is_ancestor_of(&self, ancestor: &NodeKey, key: &NodeKey) -> bool {
        self.ancestors(key).iter().any(|k| k == ancestor)
    }

    /// Reachable from the root through parent links.
    pub fn is_attached(&self, key: &NodeKey) -> bool {
        if key.is_root() {
            return self.contains(key);
        }
        match self.ancestors(key).last() {
            Some(top) => top.is_root(),
            None => false,
        }
    }

    pub fn index_in_parent(&self, key: &NodeKey) -> Option<usize> {
        let parent = self.parent_of(key)?;
        parent.children().iter().position(|child| child == key)
    }

    pub fn child_at(&self, parent: &NodeKey, index: usize) -> Option<&NodeKey> {
        self.children(parent).get(index)
    }

    pub fn previous_sibling(&self, key: &NodeKey) -> Option<&NodeKey> {
        let parent = self.parent_of(key)?;
        let index = parent.children().iter().position(|child| child == key)?;
        index.checked_sub(1).and_then(|i| parent.children().get(i))
    }

    pub fn next_sibling(&self, key: &NodeKey) -> Option<&NodeKey> {
        let parent = self.parent_of(key)?;
        let index = parent.children().iter().position(|child| child == key)?;
        parent.children().get(index + 1)
    }

    /// Deepest first descendant (the node itself when it has no children).
    pub fn first_leaf(&self, key: &NodeKey) -> NodeKey {
        let mut current = key.clone();
        while let Some(first) = self.children(&current).first() {
            current = first.clone();
        }
        current
    }

    /// Deepest last descendant (the node itself when it has no children).
    pub fn last_leaf(&self, key: &NodeKey) -> NodeKey {
        let mut current = key.clone();
        while let Some(last) = self.children(&current).last() {
            current = last.clone();
        }
        current
    }

    /// The node and all of its descendants in document (pre-)order.
    pub fn subtree(&self, key: &NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key.clone()];
        while let Some(current) = stack.pop() {
            if !self.contains(&current) {
                continue;
            }
            stack.extend(self.children(&current).iter().rev().cloned());
            out.push(current);
        }
        out
    }

    /// Pre-order successor, skipping `key`'s own descendants when `skip_children` is set.
    pub fn next_in_order(&self, key: &NodeKey, skip_children: bool) -> Option<NodeKey> {
        if !skip_children {
            if let Some(first) = self.children(key).first() {
                return Some(first.clone());
            }
        }
        let mut current = key.clone();
        loop {
            if let Some(next) = self.next_sibling(&current) {
                return Some(next.clone());
            }
            current = self.get(&current)?.parent.clone()?;
        }
    }

    /// Child-index path from the root; `None` for detached nodes.
    pub fn path(&self, key: &NodeKey) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = key.clone();
        while !current.is_root() {
            let index = self.index_in_parent(&current)?;
            path.push(index);
            current = self.get(&current)?.parent.clone()?;
            if path.len() > self.nodes.len() {
                return None;
            }
        }
        path.reverse();
        Some(path)
    }

    /// Document order of two attached nodes. An ancestor sorts before its descendants.
    pub fn compare_order(&self, a: &NodeKey, b: &NodeKey) -> Option<Ordering> {
        Some(self.path(a)?.cmp(&self.path(b)?))
    }

    pub fn common_ancestor(&self, a: &NodeKey, b: &NodeKey) -> Option<NodeKey> {
        let mut a_chain = vec![a.clone()];
        a_chain.extend(self.ancestors(a));
        let b_chain: HashSet<NodeKey> = std::iter::once(b.clone())
            .chain(self.ancestors(b))
            .collect();
        a_chain.into_iter().find(|key| b_chain.contains(key))
    }

    /// The ancestor-or-self whose parent is the root or a shadow root.
    pub fn top_level(&self, key: &NodeKey) -> Option<NodeKey> {
        let mut current = key.clone();
        loop {
            let node = self.get(&current)?;
            let parent = self.get(node.parent.as_ref()?)?;
            if parent.is_shadow_root() {
                return Some(current);
            }
            current = parent.key.clone();
        }
    }

    /// Self if it is a block element, otherwise the nearest block ancestor.
    pub fn nearest_block(&self, key: &NodeKey) -> Option<NodeKey> {
        let node = self.get(key)?;
        if node.is_block() {
            return Some(key.clone());
        }
        self.ancestors(key)
            .into_iter()
            .find(|ancestor| self.get(ancestor).is_some_and(Node::is_block))
    }

    /// Plain-text rendering of a subtree. Sibling blocks are separated by a
    /// blank line.
    pub fn text_content(&self, key: &NodeKey) -> String {
        let mut out = String::new();
        self.collect_text(key, &mut out);
        out
    }

    fn collect_text(&self, key: &NodeKey, out: &mut String) {
        let Some(node) = self.get(key) else {
            return;
        };
        out.push_str(node.own_text());
        let children = node.children();
        for (i, child) in children.iter().enumerate() {
            self.collect_text(child, out);
            let is_block = self.get(child).is_some_and(Node::is_block);
            if is_block && i + 1 < children.len() {
                out.push_str("\n\n");
            }
        }
    }

    /// Check the tree invariants: a single root without parent, every other
    /// attached node listed exactly once by its parent, no cycles, and only
    /// elements carry children.
    pub fn validate(&self) -> ModelResult<()> {
        let root = self
            .root()
            .ok_or_else(|| ModelError::invalid_structure("missing root"))?;
        if root.parent.is_some() {
            return Err(ModelError::invalid_structure("root has a parent"));
        }

        let mut seen = HashSet::new();
        let mut stack = vec![NodeKey::root()];
        while let Some(key) = stack.pop() {
            if !seen.insert(key.clone()) {
                return Err(ModelError::invalid_structure(format!(
                    "node {key} is reachable twice"
                )));
            }
            let node = self.node(&key)?;
            for child in node.children() {
                let child_node = self.node(child)?;
                if child.is_root() {
                    return Err(ModelError::invalid_structure("root is a child"));
                }
                if child_node.parent.as_ref() != Some(&key) {
                    return Err(ModelError::invalid_structure(format!(
                        "node {child} does not point back to parent {key}"
                    )));
                }
                stack.push(child.clone());
            }
        }

        for (key, node) in self.iter() {
            if seen.contains(key) {
                continue;
            }
            if node.parent.is_some() {
                return Err(ModelError::invalid_structure(format!(
                    "node {key} has a parent but is not reachable from the root"
                )));
            }
        }
        Ok(())
    }
}
