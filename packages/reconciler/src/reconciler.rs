//! Dirty-set driven reconciliation
//!
//! Walks the committed tree from the root, descending only into elements the
//! dirty set names. Dirty elements get a keyed child diff against the previous
//! state; dirty leaves are patched in place through the host's update hook.
//! Subtrees nobody touched are never visited.

use crate::host::{
    DecoratorDelta, DecoratorSlot, PresentationHandle, PresentationHost, RenderConfig, ResolvedPoint,
    ResolvedSelection,
};
use crate::keyed::longest_increasing_subsequence;
use crate::{ReconcileError, ReconcileResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tessera_model::{
    normalize_point, DirtySet, EditorState, ElementDirt, Node, NodeKey, NodeMap, NodeRegistry, Point,
    Selection,
};
use tracing::{debug, error, instrument, warn};

/// What one reconciliation did to the presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub full: bool,
    pub created: usize,
    pub updated: usize,
    pub moved: usize,
    pub destroyed: usize,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        !self.full && self.created == 0 && self.updated == 0 && self.moved == 0 && self.destroyed == 0
    }
}

/// Inputs of one reconciliation.
#[derive(Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub prev: &'a EditorState,
    pub next: &'a EditorState,
    pub dirty: &'a DirtySet,
    pub registry: &'a NodeRegistry,
    pub config: &'a RenderConfig,
}

/// Keeps the mapping from node keys to the handles mounted in a host.
#[derive(Debug, Default)]
pub struct Reconciler {
    handles: HashMap<NodeKey, PresentationHandle>,
    decorators: HashSet<NodeKey>,
    needs_full: bool,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, key: &NodeKey) -> Option<PresentationHandle> {
        self.handles.get(key).copied()
    }

    pub fn mounted_len(&self) -> usize {
        self.handles.len()
    }

    /// Make the next reconciliation rebuild the presentation from scratch.
    pub fn mark_full(&mut self) {
        self.needs_full = true;
    }

    pub fn needs_full(&self) -> bool {
        self.needs_full || self.handles.is_empty()
    }

    /// Forget every handle, e.g. when the host is detached.
    pub fn reset(&mut self) {
        self.handles.clear();
        self.decorators.clear();
        self.needs_full = true;
    }

    /// Bring `host` from `input.prev` to `input.next`.
    ///
    /// A failure leaves whatever was already applied in place and makes the
    /// following call a full rebuild.
    #[instrument(skip_all, fields(dirty = input.dirty.len()))]
    pub fn reconcile(
        &mut self,
        host: &mut dyn PresentationHost,
        input: ReconcileInput<'_>,
    ) -> ReconcileResult<ReconcileSummary> {
        let full = self.needs_full() || input.dirty.is_full_reconcile();
        let mut pass = Pass {
            host,
            input,
            handles: &mut self.handles,
            mounted_decorators: &mut self.decorators,
            recreated: HashSet::new(),
            delta: DecoratorDelta::default(),
            summary: ReconcileSummary {
                full,
                ..Default::default()
            },
        };

        match pass.run(full) {
            Ok(summary) => {
                self.needs_full = false;
                debug!(
                    full = summary.full,
                    created = summary.created,
                    updated = summary.updated,
                    moved = summary.moved,
                    destroyed = summary.destroyed,
                    "reconciled"
                );
                Ok(summary)
            }
            Err(err) => {
                self.needs_full = true;
                error!(error = %err, "reconciliation failed, the next commit rebuilds the presentation");
                Err(err)
            }
        }
    }
}

struct Pass<'a, 'h> {
    host: &'h mut dyn PresentationHost,
    input: ReconcileInput<'a>,
    handles: &'a mut HashMap<NodeKey, PresentationHandle>,
    mounted_decorators: &'a mut HashSet<NodeKey>,
    /// Keys (re)built during this pass.
    recreated: HashSet<NodeKey>,
    delta: DecoratorDelta,
    summary: ReconcileSummary,
}

impl Pass<'_, '_> {
    fn prev(&self) -> &NodeMap {
        &self.input.prev.nodes
    }

    fn next(&self) -> &NodeMap {
        &self.input.next.nodes
    }

    fn run(&mut self, full: bool) -> ReconcileResult<ReconcileSummary> {
        let root = NodeKey::root();
        if full {
            self.rebuild_all()?;
        } else {
            self.reconcile_node(&root)?;
        }

        let selection = self.resolve_selection()?;
        self.host.apply_selection(selection.as_ref())?;

        if !self.delta.is_empty() {
            let delta = std::mem::take(&mut self.delta);
            self.host.decorators_changed(delta);
        }
        Ok(self.summary)
    }

    fn rebuild_all(&mut self) -> ReconcileResult<()> {
        self.host.clear()?;
        self.handles.clear();
        self.delta.removed.extend(self.mounted_decorators.drain());
        self.summary.full = true;
        self.build(&NodeKey::root())?;
        Ok(())
    }

    fn handle_of(&self, key: &NodeKey) -> ReconcileResult<PresentationHandle> {
        self.handles
            .get(key)
            .copied()
            .ok_or_else(|| ReconcileError::MissingHandle(key.clone()))
    }

    fn next_node(&self, key: &NodeKey) -> ReconcileResult<&Arc<Node>> {
        self.input
            .next
            .nodes
            .get_arc(key)
            .ok_or_else(|| ReconcileError::MissingNode(key.clone()))
    }

    fn decorator_slot(&self, node: &Node, handle: PresentationHandle) -> DecoratorSlot {
        let payload = self
            .input
            .registry
            .get(node.node_type())
            .and_then(|descriptor| descriptor.decorate)
            .map(|decorate| decorate(node));
        DecoratorSlot {
            key: node.key.clone(),
            node_type: node.node_type().to_string(),
            handle,
            payload,
        }
    }

    /// Create `key` and its whole subtree from the next state.
    fn build(&mut self, key: &NodeKey) -> ReconcileResult<PresentationHandle> {
        let node = Arc::clone(self.next_node(key)?);
        let handle = self.host.create(&node, self.input.config)?;
        self.handles.insert(key.clone(), handle);
        self.recreated.insert(key.clone());
        self.summary.created += 1;

        if node.is_decorator() {
            let slot = self.decorator_slot(&node, handle);
            self.delta.added.push(slot);
            self.mounted_decorators.insert(key.clone());
        }

        for (index, child) in node.children().iter().enumerate() {
            let child_handle = self.build(child)?;
            self.host.insert_child(handle, child_handle, index)?;
        }
        Ok(handle)
    }

    /// Drop the handles of `key`'s previous subtree, except for nodes that were
    /// already rebuilt elsewhere during this pass.
    fn forget_subtree(&mut self, key: &NodeKey) {
        for old in self.input.prev.nodes.subtree(key) {
            if self.recreated.contains(&old) {
                continue;
            }
            self.handles.remove(&old);
            if self.mounted_decorators.remove(&old) {
                self.delta.removed.push(old);
            }
        }
    }

    /// A node that moved here from another parent: unmount it from where it
    /// still is before it gets rebuilt.
    fn detach_existing(&mut self, key: &NodeKey) -> ReconcileResult<()> {
        let Some(old) = self.handles.get(key).copied() else {
            return Ok(());
        };
        let old_parent = self
            .prev()
            .get(key)
            .and_then(|node| node.parent.as_ref())
            .and_then(|parent| self.handles.get(parent))
            .copied();
        if let Some(parent) = old_parent {
            self.host.remove_child(parent, old)?;
        }
        self.host.destroy(old)?;
        self.summary.destroyed += 1;
        self.forget_subtree(key);
        Ok(())
    }

    fn reconcile_node(&mut self, key: &NodeKey) -> ReconcileResult<()> {
        let node = Arc::clone(self.next_node(key)?);
        if !node.is_element() {
            if self.input.dirty.is_leaf_dirty(key) {
                self.update_in_place(&node)?;
            }
            return Ok(());
        }

        let Some(dirt) = self.input.dirty.element(key) else {
            return Ok(());
        };
        if dirt >= ElementDirt::Changed {
            if self.update_in_place(&node)? {
                return Ok(());
            }
            self.diff_children(&node)?;
        }
        for child in node.children() {
            if !self.recreated.contains(child) {
                self.reconcile_node(child)?;
            }
        }
        Ok(())
    }

    /// Run the update hook if the node changed. Returns `true` when the node
    /// had to be recreated (its subtree is then already up to date).
    fn update_in_place(&mut self, node: &Arc<Node>) -> ReconcileResult<bool> {
        let key = &node.key;
        let Some(prev) = self.prev().get_arc(key).cloned() else {
            return Ok(false);
        };
        if Arc::ptr_eq(&prev, node) {
            return Ok(false);
        }
        let handle = self.handle_of(key)?;

        if node.is_decorator() {
            if prev.as_ref() != node.as_ref() {
                let slot = self.decorator_slot(node, handle);
                self.delta.changed.push(slot);
            }
            return Ok(false);
        }

        let needs_recreate = self.host.update(&prev, node, handle, self.input.config)?;
        self.summary.updated += 1;
        if !needs_recreate {
            return Ok(false);
        }

        debug!(key = %key, node_type = node.node_type(), "recreating node");
        if key.is_root() {
            self.rebuild_all()?;
            return Ok(true);
        }
        let parent = node
            .parent
            .clone()
            .ok_or_else(|| ReconcileError::MissingNode(key.clone()))?;
        let parent_handle = self.handle_of(&parent)?;
        let index = self
            .next()
            .index_in_parent(key)
            .ok_or_else(|| ReconcileError::MissingNode(key.clone()))?;

        self.host.remove_child(parent_handle, handle)?;
        self.host.destroy(handle)?;
        self.summary.destroyed += 1;
        self.forget_subtree(key);
        let fresh = self.build(key)?;
        self.host.insert_child(parent_handle, fresh, index)?;
        Ok(true)
    }

    /// Keyed diff of an element's child list: removals first, then creations
    /// and moves in next-state order. Children on the longest increasing run
    /// of previous positions stay put.
    fn diff_children(&mut self, node: &Node) -> ReconcileResult<()> {
        let parent_handle = self.handle_of(&node.key)?;
        let next_children = node.children();
        let next_set: HashSet<&NodeKey> = next_children.iter().collect();
        let prev_children: Vec<NodeKey> = self.prev().children(&node.key).to_vec();

        let mut current: Vec<NodeKey> = Vec::with_capacity(prev_children.len());
        for child in prev_children {
            if next_set.contains(&child) {
                current.push(child);
                continue;
            }
            if self.recreated.contains(&child) {
                continue;
            }
            if let Some(handle) = self.handles.get(&child).copied() {
                self.host.remove_child(parent_handle, handle)?;
                self.host.destroy(handle)?;
                self.summary.destroyed += 1;
            }
            self.forget_subtree(&child);
        }

        let prev_position: HashMap<NodeKey, usize> = current
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), i))
            .collect();
        let kept: Vec<&NodeKey> = next_children
            .iter()
            .filter(|key| prev_position.contains_key(*key))
            .collect();
        let positions: Vec<usize> = kept.iter().map(|key| prev_position[*key]).collect();
        let stable: HashSet<&NodeKey> = longest_increasing_subsequence(&positions)
            .into_iter()
            .map(|i| kept[i])
            .collect();

        for (i, child) in next_children.iter().enumerate() {
            if !prev_position.contains_key(child) {
                self.detach_existing(child)?;
                let handle = self.build(child)?;
                let at = insertion_index(&current, next_children, i);
                self.host.insert_child(parent_handle, handle, at)?;
                current.insert(at, child.clone());
            } else if !stable.contains(child) {
                let handle = self.handle_of(child)?;
                if let Some(from) = current.iter().position(|k| k == child) {
                    current.remove(from);
                }
                let at = insertion_index(&current, next_children, i);
                self.host.move_child(parent_handle, handle, at)?;
                current.insert(at, child.clone());
                self.summary.moved += 1;
            }
        }
        Ok(())
    }

    fn resolve_selection(&self) -> ReconcileResult<Option<ResolvedSelection>> {
        let Some(selection) = &self.input.next.selection else {
            return Ok(None);
        };
        let resolved = match selection {
            Selection::Range(range) => ResolvedSelection::Range {
                anchor: self.resolve_point(&range.anchor)?,
                focus: self.resolve_point(&range.focus)?,
            },
            Selection::Node(nodes) => ResolvedSelection::Node(
                nodes
                    .keys
                    .iter()
                    .filter_map(|key| self.handles.get(key).copied())
                    .collect(),
            ),
            Selection::Grid(grid) => ResolvedSelection::Grid {
                grid: self.handle_of(&grid.grid_key)?,
                anchor_cell: self.handle_of(&grid.anchor_cell)?,
                focus_cell: self.handle_of(&grid.focus_cell)?,
            },
        };
        Ok(Some(resolved))
    }

    fn resolve_point(&self, point: &Point) -> ReconcileResult<ResolvedPoint> {
        let point = match normalize_point(self.next(), point) {
            Ok(_) => point.clone(),
            Err(_) => {
                warn!(key = %point.key, "selection point is detached, falling back to the document start");
                normalize_point(self.next(), &Point::element(NodeKey::root(), 0))
                    .unwrap_or_else(|_| Point::element(NodeKey::root(), 0))
            }
        };
        Ok(ResolvedPoint {
            handle: self.handle_of(&point.key)?,
            key: point.key,
            offset: point.offset,
            point_type: point.point_type,
        })
    }
}

/// Where the `i`th next-state child goes: right after its next-state
/// predecessor, which is already in place.
fn insertion_index(current: &[NodeKey], next_children: &[NodeKey], i: usize) -> usize {
    match i.checked_sub(1).map(|p| &next_children[p]) {
        Some(previous) => current
            .iter()
            .position(|key| key == previous)
            .map_or(current.len(), |p| p + 1),
        None => 0,
    }
}
