//! # Transactions
//!
//! Every read and write of the document goes through a [`Txn`]. A read
//! transaction borrows the committed state and refuses writes with
//! `ReadOnlyViolation`; a write transaction owns a draft cloned from the
//! committed state. The clone shares every node allocation with its source
//! until [`Txn::get_writable`] copies one, so readers of the committed state
//! never observe a pending edit.
//!
//! The transaction is passed explicitly to mutators, transforms and command
//! handlers; there is no ambient "active editor".

use crate::{EditorError, EditorResult};
use std::collections::VecDeque;
use tessera_model::{
    normalize_point, point_at_end, point_at_start, tags, DirtySet, EditorState, ElementDirt, ElementNode,
    GridSelection, KeyGenerator, ModelError, Node, NodeKey, NodeMap, NodeRegistry, NodeSelection,
    Point, RangeSelection, Selection, TextFormat, TextNode,
};
use tracing::warn;

/// Tag for updates produced by undo/redo.
pub const TAG_HISTORIC: &str = "historic";

/// Tag for updates the history collaborator should not record.
pub const TAG_WITHOUT_HISTORY: &str = "without-history";

/// A deferred unit of work against a write transaction.
pub type Mutator = Box<dyn FnOnce(&mut Txn<'_>) -> EditorResult<()>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Commit synchronously instead of waiting for the next flush.
    pub discrete: bool,
    pub tag: Option<String>,
}

impl UpdateOptions {
    pub fn discrete() -> Self {
        Self {
            discrete: true,
            tag: None,
        }
    }

    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            discrete: false,
            tag: Some(tag.into()),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

enum Draft<'a> {
    Frozen(&'a EditorState),
    Pending(EditorState),
}

/// Access to one version of the document.
pub struct Txn<'a> {
    draft: Draft<'a>,
    registry: &'a NodeRegistry,
    keys: Option<&'a mut KeyGenerator>,
    /// Everything dirtied by the transaction.
    dirty: DirtySet,
    /// Dirtied since the last transform round started.
    round: DirtySet,
    tags: Vec<String>,
    nested: VecDeque<Mutator>,
    deferred: Vec<(Mutator, UpdateOptions)>,
}

pub(crate) struct TxnOutcome {
    pub state: EditorState,
    pub dirty: DirtySet,
    pub tags: Vec<String>,
    pub deferred: Vec<(Mutator, UpdateOptions)>,
}

impl<'a> Txn<'a> {
    pub(crate) fn read_only(state: &'a EditorState, registry: &'a NodeRegistry) -> Self {
        Self {
            draft: Draft::Frozen(state),
            registry,
            keys: None,
            dirty: DirtySet::new(),
            round: DirtySet::new(),
            tags: Vec::new(),
            nested: VecDeque::new(),
            deferred: Vec::new(),
        }
    }

    pub(crate) fn writable(
        state: EditorState,
        registry: &'a NodeRegistry,
        keys: &'a mut KeyGenerator,
        tags: Vec<String>,
    ) -> Self {
        Self {
            draft: Draft::Pending(state),
            registry,
            keys: Some(keys),
            dirty: DirtySet::new(),
            round: DirtySet::new(),
            tags,
            nested: VecDeque::new(),
            deferred: Vec::new(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.draft, Draft::Frozen(_))
    }

    pub fn state(&self) -> &EditorState {
        match &self.draft {
            Draft::Frozen(state) => state,
            Draft::Pending(state) => state,
        }
    }

    pub fn nodes(&self) -> &NodeMap {
        &self.state().nodes
    }

    pub fn registry(&self) -> &'a NodeRegistry {
        self.registry
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes().get(key)
    }

    pub fn node(&self, key: &NodeKey) -> EditorResult<&Node> {
        Ok(self.nodes().node(key)?)
    }

    pub fn text(&self, key: &NodeKey) -> EditorResult<&TextNode> {
        self.node(key)?
            .as_text()
            .ok_or_else(|| ModelError::invalid_structure(format!("{key} is not a text node")).into())
    }

    pub fn element(&self, key: &NodeKey) -> EditorResult<&ElementNode> {
        self.node(key)?
            .as_element()
            .ok_or_else(|| ModelError::invalid_structure(format!("{key} is not an element")).into())
    }

    pub fn parent(&self, key: &NodeKey) -> Option<NodeKey> {
        self.get(key).and_then(|node| node.parent.clone())
    }

    /// Child keys, copied so the caller may mutate while iterating.
    pub fn children(&self, key: &NodeKey) -> Vec<NodeKey> {
        self.nodes().children(key).to_vec()
    }

    pub fn text_content(&self, key: &NodeKey) -> String {
        self.nodes().text_content(key)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.state().selection.as_ref()
    }

    pub fn range_selection(&self) -> Option<&RangeSelection> {
        self.selection().and_then(Selection::as_range)
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.has_tag(&tag) {
            self.tags.push(tag);
        }
    }

    /// Nodes dirtied so far in this transaction.
    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub(crate) fn draft_mut(&mut self) -> EditorResult<&mut EditorState> {
        match &mut self.draft {
            Draft::Pending(state) => Ok(state),
            Draft::Frozen(_) => Err(EditorError::ReadOnlyViolation),
        }
    }

    /// The draft-owned copy of `key`, cloned from the committed state on the
    /// first write. Marks the node dirty and its ancestors as containing a
    /// dirty node.
    pub fn get_writable(&mut self, key: &NodeKey) -> EditorResult<&mut Node> {
        self.mark_chain(key)?;
        let state = self.draft_mut()?;
        state
            .nodes
            .make_mut(key)
            .ok_or_else(|| ModelError::not_found(key).into())
    }

    /// Dirty `key` without changing it, so transforms and the reconciler
    /// revisit it.
    pub fn mark_dirty(&mut self, key: &NodeKey) -> EditorResult<()> {
        self.get_writable(key).map(|_| ())
    }

    fn mark_chain(&mut self, key: &NodeKey) -> EditorResult<()> {
        let Draft::Pending(state) = &self.draft else {
            return Err(EditorError::ReadOnlyViolation);
        };
        let is_element = state.nodes.node(key)?.is_element();
        let ancestors = state.nodes.ancestors(key);
        for set in [&mut self.dirty, &mut self.round] {
            if is_element {
                set.mark_element(key.clone(), ElementDirt::Changed);
            } else {
                set.mark_leaf(key.clone());
            }
            for ancestor in &ancestors {
                set.mark_element(ancestor.clone(), ElementDirt::Ancestor);
            }
        }
        Ok(())
    }

    pub(crate) fn writable_element(&mut self, key: &NodeKey) -> EditorResult<&mut ElementNode> {
        self.get_writable(key)?
            .as_element_mut()
            .ok_or_else(|| ModelError::invalid_structure(format!("{key} is not an element")).into())
    }

    pub(crate) fn writable_text(&mut self, key: &NodeKey) -> EditorResult<&mut TextNode> {
        self.get_writable(key)?
            .as_text_mut()
            .ok_or_else(|| ModelError::invalid_structure(format!("{key} is not a text node")).into())
    }

    pub fn generate_key(&mut self) -> EditorResult<NodeKey> {
        self.draft_mut()?;
        match self.keys.as_deref_mut() {
            Some(keys) => Ok(keys.generate()),
            None => Err(EditorError::ReadOnlyViolation),
        }
    }

    /// Add a detached node to the draft and mark it dirty.
    pub fn insert_detached(&mut self, mut node: Node) -> EditorResult<NodeKey> {
        let key = node.key.clone();
        node.parent = None;
        self.draft_mut()?.nodes.insert(node);
        self.mark_dirty(&key)?;
        Ok(key)
    }

    /// A detached node of a registered type with its default fields.
    pub fn create_node(&mut self, node_type: &str) -> EditorResult<NodeKey> {
        let key = self.generate_key()?;
        let node = self.registry.create(node_type, key)?;
        self.insert_detached(node)
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> EditorResult<NodeKey> {
        self.create_text_node(TextNode::new(text))
    }

    pub fn create_text_node(&mut self, text: TextNode) -> EditorResult<NodeKey> {
        self.registry.require(tags::TEXT)?;
        let key = self.generate_key()?;
        self.insert_detached(Node::text(key, text))
    }

    pub fn create_paragraph(&mut self) -> EditorResult<NodeKey> {
        self.create_node(tags::PARAGRAPH)
    }

    pub fn create_line_break(&mut self) -> EditorResult<NodeKey> {
        self.create_node(tags::LINE_BREAK)
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) -> EditorResult<()> {
        self.draft_mut()?.selection = selection;
        Ok(())
    }

    /// Collapse the selection at the start of `key`'s content.
    pub fn select_start(&mut self, key: &NodeKey) -> EditorResult<()> {
        let point = point_at_start(self.nodes(), key)?;
        self.set_caret(point)
    }

    /// Collapse the selection at the end of `key`'s content.
    pub fn select_end(&mut self, key: &NodeKey) -> EditorResult<()> {
        let point = point_at_end(self.nodes(), key)?;
        self.set_caret(point)
    }

    pub fn select(&mut self, anchor: Point, focus: Point) -> EditorResult<()> {
        for point in [&anchor, &focus] {
            if !self.nodes().is_attached(&point.key) {
                return Err(ModelError::SelectionLost.into());
            }
        }
        let mut range = RangeSelection::new(anchor, focus);
        if let Some((format, style)) = self.typing_format(&range.anchor) {
            range.format = format;
            range.style = style;
        }
        self.set_selection(Some(Selection::Range(range)))
    }

    pub fn select_nodes(&mut self, keys: impl IntoIterator<Item = NodeKey>) -> EditorResult<()> {
        self.set_selection(Some(Selection::Node(NodeSelection::new(keys))))
    }

    pub fn select_grid(&mut self, grid: NodeKey, anchor_cell: NodeKey, focus_cell: NodeKey) -> EditorResult<()> {
        let selection = GridSelection::new(grid, anchor_cell, focus_cell);
        tessera_model::grid_bounds(self.nodes(), &selection)?;
        self.set_selection(Some(Selection::Grid(selection)))
    }

    /// Collapse at `point`. The typing format follows the text node the
    /// caret lands in; on an element point a range keeps its format.
    pub(crate) fn set_caret(&mut self, point: Point) -> EditorResult<()> {
        let typing = self.typing_format(&point);
        let state = self.draft_mut()?;
        if state.selection.as_ref().and_then(Selection::as_range).is_none() {
            state.selection = Some(Selection::caret(point.clone()));
        }
        if let Some(range) = state.selection.as_mut().and_then(Selection::as_range_mut) {
            range.anchor = point.clone();
            range.focus = point;
            if let Some((format, style)) = typing {
                range.format = format;
                range.style = style;
            }
        }
        Ok(())
    }

    fn typing_format(&self, point: &Point) -> Option<(TextFormat, String)> {
        if !point.is_text() {
            return None;
        }
        self.get(&point.key)
            .and_then(Node::as_text)
            .map(|text| (text.format, text.style.clone()))
    }

    /// Rewrite range selection points; `f` returns the replacement for a
    /// point, or `None` to keep it.
    pub(crate) fn update_points(
        &mut self,
        mut f: impl FnMut(&NodeMap, &Point) -> Option<Point>,
    ) -> EditorResult<()> {
        let EditorState { nodes, selection } = self.draft_mut()?;
        if let Some(Selection::Range(range)) = selection {
            for point in [&mut range.anchor, &mut range.focus] {
                if let Some(replacement) = f(nodes, point) {
                    *point = replacement;
                }
            }
        }
        Ok(())
    }

    /// Run `f` in this transaction after the current mutator returns. With
    /// `discrete` set, `f` runs in its own transaction after this one commits.
    pub fn update(
        &mut self,
        f: impl FnOnce(&mut Txn<'_>) -> EditorResult<()> + 'static,
        options: UpdateOptions,
    ) -> EditorResult<()> {
        self.draft_mut()?;
        if options.discrete {
            self.deferred.push((Box::new(f), options));
        } else {
            if let Some(tag) = &options.tag {
                self.add_tag(tag.clone());
            }
            self.nested.push_back(Box::new(f));
        }
        Ok(())
    }

    pub(crate) fn run_nested(&mut self) -> EditorResult<()> {
        while let Some(f) = self.nested.pop_front() {
            f(&mut *self)?;
        }
        Ok(())
    }

    pub(crate) fn has_nested(&self) -> bool {
        !self.nested.is_empty()
    }

    pub(crate) fn round(&self) -> &DirtySet {
        &self.round
    }

    pub(crate) fn take_round(&mut self) -> DirtySet {
        std::mem::take(&mut self.round)
    }

    /// Drop nodes from the draft and from the dirty bookkeeping.
    pub(crate) fn drop_nodes(&mut self, keys: &[NodeKey]) -> EditorResult<()> {
        let state = self.draft_mut()?;
        for key in keys {
            state.nodes.remove(key);
        }
        for key in keys {
            self.dirty.remove(key);
            self.round.remove(key);
        }
        Ok(())
    }

    /// Re-resolve the selection against the final draft. Points that no
    /// longer resolve fall back to a caret at the start of the root.
    pub(crate) fn repair_selection(&mut self) -> EditorResult<()> {
        let EditorState { nodes, selection } = self.draft_mut()?;
        let repaired = match selection.take() {
            None => None,
            Some(Selection::Range(mut range)) => {
                match (normalize_point(nodes, &range.anchor), normalize_point(nodes, &range.focus)) {
                    (Ok(anchor), Ok(focus)) => {
                        range.anchor = anchor;
                        range.focus = focus;
                        Some(Selection::Range(range))
                    }
                    _ => {
                        warn!("selection points no longer resolve, falling back to the root");
                        Some(Selection::caret(root_caret(nodes)))
                    }
                }
            }
            Some(Selection::Node(mut node_selection)) => {
                node_selection.keys.retain(|key| nodes.is_attached(key));
                if node_selection.is_empty() {
                    warn!("every selected node was removed, falling back to the root");
                    Some(Selection::caret(root_caret(nodes)))
                } else {
                    Some(Selection::Node(node_selection))
                }
            }
            Some(Selection::Grid(grid)) => {
                let intact = nodes.is_attached(&grid.grid_key)
                    && tessera_model::grid_bounds(nodes, &grid).is_ok();
                if intact {
                    Some(Selection::Grid(grid))
                } else {
                    warn!(grid = %grid.grid_key, "grid selection lost its cells, falling back to the root");
                    Some(Selection::caret(root_caret(nodes)))
                }
            }
        };
        *selection = repaired;
        Ok(())
    }

    pub(crate) fn into_outcome(self) -> Option<TxnOutcome> {
        match self.draft {
            Draft::Pending(state) => Some(TxnOutcome {
                state,
                dirty: self.dirty,
                tags: self.tags,
                deferred: self.deferred,
            }),
            Draft::Frozen(_) => None,
        }
    }
}

/// Caret at the start of the document, the last-resort selection.
pub(crate) fn root_caret(nodes: &NodeMap) -> Point {
    let root = Point::element(NodeKey::root(), 0);
    normalize_point(nodes, &root).unwrap_or(root)
}
