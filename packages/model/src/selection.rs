//! Selection snapshots
//!
//! Selections address the tree through [`Point`]s (key + offset). They are
//! plain values: all structural knowledge comes from the [`NodeMap`] they are
//! read against, so a selection can be carried from one state to the next and
//! repaired there.

use crate::{ModelError, ModelResult, NodeKey, NodeKind, NodeMap, TextFormat};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointType {
    /// Offset counts characters of a text node.
    Text,
    /// Offset counts children of an element.
    Element,
}

/// One end of a selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
    pub point_type: PointType,
}

impl Point {
    pub fn text(key: impl Into<NodeKey>, offset: usize) -> Self {
        Self {
            key: key.into(),
            offset,
            point_type: PointType::Text,
        }
    }

    pub fn element(key: impl Into<NodeKey>, offset: usize) -> Self {
        Self {
            key: key.into(),
            offset,
            point_type: PointType::Element,
        }
    }

    pub fn is_text(&self) -> bool {
        self.point_type == PointType::Text
    }

    /// Position as a sortable sequence: the node's child-index path followed
    /// by the offset.
    fn position(&self, nodes: &NodeMap) -> ModelResult<Vec<usize>> {
        let mut path = nodes.path(&self.key).ok_or(ModelError::SelectionLost)?;
        path.push(self.offset);
        Ok(path)
    }
}

/// Document order of two points. Fails with `SelectionLost` when either
/// point is not attached to the tree.
pub fn compare_points(nodes: &NodeMap, a: &Point, b: &Point) -> ModelResult<Ordering> {
    if a.key == b.key {
        return Ok(a.offset.cmp(&b.offset));
    }
    Ok(a.position(nodes)?.cmp(&b.position(nodes)?))
}

/// Caret position at the very start of `key`'s content.
pub fn point_at_start(nodes: &NodeMap, key: &NodeKey) -> ModelResult<Point> {
    let leaf = nodes.first_leaf(key);
    leaf_edge_point(nodes, &leaf, false)
}

/// Caret position at the very end of `key`'s content.
pub fn point_at_end(nodes: &NodeMap, key: &NodeKey) -> ModelResult<Point> {
    let leaf = nodes.last_leaf(key);
    leaf_edge_point(nodes, &leaf, true)
}

fn leaf_edge_point(nodes: &NodeMap, leaf: &NodeKey, at_end: bool) -> ModelResult<Point> {
    let node = nodes.node(leaf)?;
    match &node.kind {
        NodeKind::Text(text) => Ok(Point::text(leaf.clone(), if at_end { text.len() } else { 0 })),
        NodeKind::Element(element) => Ok(Point::element(
            leaf.clone(),
            if at_end { element.len() } else { 0 },
        )),
        NodeKind::LineBreak | NodeKind::Decorator(_) => {
            let parent = node.parent.clone().ok_or(ModelError::SelectionLost)?;
            let index = nodes
                .index_in_parent(leaf)
                .ok_or(ModelError::SelectionLost)?;
            Ok(Point::element(parent, if at_end { index + 1 } else { index }))
        }
    }
}

/// Clamp a point into range and descend element points onto the text leaf
/// they sit next to, when there is one.
pub fn normalize_point(nodes: &NodeMap, point: &Point) -> ModelResult<Point> {
    if !nodes.is_attached(&point.key) {
        return Err(ModelError::SelectionLost);
    }
    let node = nodes.node(&point.key)?;
    match &node.kind {
        NodeKind::Text(text) => Ok(Point::text(point.key.clone(), point.offset.min(text.len()))),
        NodeKind::LineBreak | NodeKind::Decorator(_) => {
            let parent = node.parent.clone().ok_or(ModelError::SelectionLost)?;
            let index = nodes
                .index_in_parent(&point.key)
                .ok_or(ModelError::SelectionLost)?;
            Ok(Point::element(parent, index + usize::from(point.offset > 0)))
        }
        NodeKind::Element(element) => {
            let offset = point.offset.min(element.len());
            if element.is_empty() {
                return Ok(Point::element(point.key.clone(), 0));
            }
            let (child, at_end) = if offset < element.len() {
                (&element.children[offset], false)
            } else {
                (&element.children[element.len() - 1], true)
            };
            let child_node = nodes.node(child)?;
            match &child_node.kind {
                NodeKind::Text(text) => Ok(Point::text(
                    child.clone(),
                    if at_end { text.len() } else { 0 },
                )),
                NodeKind::Element(inner) => {
                    let inner_offset = if at_end { inner.len() } else { 0 };
                    normalize_point(nodes, &Point::element(child.clone(), inner_offset))
                }
                _ => Ok(Point::element(point.key.clone(), offset)),
            }
        }
    }
}

/// Where a point should land after the child at `index` of `parent` was
/// removed: the start of the next sibling, else the end of the previous
/// sibling, else the parent itself.
pub fn point_after_removal(nodes: &NodeMap, parent: &NodeKey, index: usize) -> ModelResult<Point> {
    if !nodes.is_attached(parent) {
        return Err(ModelError::SelectionLost);
    }
    let children = nodes.children(parent);
    if let Some(next) = children.get(index) {
        return point_at_start(nodes, next);
    }
    if let Some(previous) = index.checked_sub(1).and_then(|i| children.get(i)) {
        return point_at_end(nodes, previous);
    }
    normalize_point(nodes, &Point::element(parent.clone(), 0))
}

/// Anchor/focus selection over text and element points.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSelection {
    pub anchor: Point,
    pub focus: Point,
    /// Format applied to text typed at a collapsed caret.
    pub format: TextFormat,
    pub style: String,
}

impl RangeSelection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self {
            anchor,
            focus,
            format: TextFormat::empty(),
            style: String::new(),
        }
    }

    pub fn caret(point: Point) -> Self {
        Self::new(point.clone(), point)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_backward(&self, nodes: &NodeMap) -> ModelResult<bool> {
        Ok(compare_points(nodes, &self.anchor, &self.focus)? == Ordering::Greater)
    }

    /// Logical (document-ordered) start and end.
    pub fn start_end(&self, nodes: &NodeMap) -> ModelResult<(Point, Point)> {
        if self.is_backward(nodes)? {
            Ok((self.focus.clone(), self.anchor.clone()))
        } else {
            Ok((self.anchor.clone(), self.focus.clone()))
        }
    }

    pub fn has_format(&self, flag: TextFormat) -> bool {
        self.format.contains(flag)
    }

    pub fn toggle_format(&mut self, flag: TextFormat) {
        self.format = self.format.toggled(flag);
    }

    /// Nodes from the start node to the end node in document order.
    ///
    /// Ancestors of the start node are not included; descendants of the
    /// nodes in between are.
    pub fn get_nodes(&self, nodes: &NodeMap) -> ModelResult<Vec<NodeKey>> {
        let (start, end) = self.start_end(nodes)?;
        let first = boundary_node(nodes, &start, false);
        let last = boundary_node(nodes, &end, true);
        nodes_between(nodes, &first, &last)
    }

    pub fn text_content(&self, nodes: &NodeMap) -> ModelResult<String> {
        let (start, end) = self.start_end(nodes)?;
        let mut out = String::new();
        let mut emitted = false;
        for key in self.get_nodes(nodes)? {
            let node = nodes.node(&key)?;
            match &node.kind {
                NodeKind::Text(text) => {
                    let from = if key == start.key && start.is_text() { start.offset } else { 0 };
                    let to = if key == end.key && end.is_text() { end.offset } else { text.len() };
                    out.push_str(&text.slice(from, to));
                    emitted = true;
                }
                NodeKind::Element(_) if node.is_block() => {
                    if emitted {
                        out.push('\n');
                        emitted = false;
                    }
                }
                _ => {
                    out.push_str(node.own_text());
                    emitted = true;
                }
            }
        }
        Ok(out)
    }
}

fn boundary_node(nodes: &NodeMap, point: &Point, is_end: bool) -> NodeKey {
    if point.is_text() {
        return point.key.clone();
    }
    let children = nodes.children(&point.key);
    if is_end {
        match point.offset.checked_sub(1).and_then(|i| children.get(i)) {
            Some(child) => nodes.last_leaf(child),
            None => point.key.clone(),
        }
    } else {
        match children.get(point.offset) {
            Some(child) => child.clone(),
            None => point.key.clone(),
        }
    }
}

/// Pre-order walk from `first` to `last`, both included.
pub fn nodes_between(nodes: &NodeMap, first: &NodeKey, last: &NodeKey) -> ModelResult<Vec<NodeKey>> {
    if first == last {
        return Ok(vec![first.clone()]);
    }
    if nodes.compare_order(first, last) != Some(Ordering::Less) {
        return Ok(vec![first.clone()]);
    }
    let mut out = vec![first.clone()];
    let mut current = first.clone();
    while let Some(next) = nodes.next_in_order(&current, false) {
        out.push(next.clone());
        if &next == last {
            return Ok(out);
        }
        current = next;
    }
    Err(ModelError::SelectionLost)
}

/// An explicit, ordered set of whole nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeSelection {
    pub keys: Vec<NodeKey>,
}

impl NodeSelection {
    pub fn new(keys: impl IntoIterator<Item = NodeKey>) -> Self {
        let mut selection = Self::default();
        for key in keys {
            selection.add(key);
        }
        selection
    }

    pub fn add(&mut self, key: NodeKey) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    pub fn delete(&mut self, key: &NodeKey) {
        self.keys.retain(|k| k != key);
    }

    pub fn has(&self, key: &NodeKey) -> bool {
        self.keys.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn text_content(&self, nodes: &NodeMap) -> String {
        self.keys.iter().map(|key| nodes.text_content(key)).collect()
    }
}

/// A rectangular cell range inside a table.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSelection {
    pub grid_key: NodeKey,
    pub anchor_cell: NodeKey,
    pub focus_cell: NodeKey,
}

impl GridSelection {
    pub fn new(grid_key: NodeKey, anchor_cell: NodeKey, focus_cell: NodeKey) -> Self {
        Self {
            grid_key,
            anchor_cell,
            focus_cell,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Range(RangeSelection),
    Node(NodeSelection),
    Grid(GridSelection),
}

impl Selection {
    pub fn caret(point: Point) -> Self {
        Selection::Range(RangeSelection::caret(point))
    }

    pub fn range(anchor: Point, focus: Point) -> Self {
        Selection::Range(RangeSelection::new(anchor, focus))
    }

    pub fn is_collapsed(&self) -> bool {
        match self {
            Selection::Range(range) => range.is_collapsed(),
            Selection::Node(_) | Selection::Grid(_) => false,
        }
    }

    pub fn as_range(&self) -> Option<&RangeSelection> {
        match self {
            Selection::Range(range) => Some(range),
            _ => None,
        }
    }

    pub fn as_range_mut(&mut self) -> Option<&mut RangeSelection> {
        match self {
            Selection::Range(range) => Some(range),
            _ => None,
        }
    }

    /// Every key the selection refers to.
    pub fn keys(&self) -> Vec<NodeKey> {
        match self {
            Selection::Range(range) => vec![range.anchor.key.clone(), range.focus.key.clone()],
            Selection::Node(node) => node.keys.clone(),
            Selection::Grid(grid) => vec![
                grid.grid_key.clone(),
                grid.anchor_cell.clone(),
                grid.focus_cell.clone(),
            ],
        }
    }

    pub fn get_nodes(&self, nodes: &NodeMap) -> ModelResult<Vec<NodeKey>> {
        match self {
            Selection::Range(range) => range.get_nodes(nodes),
            Selection::Node(node) => Ok(node.keys.clone()),
            Selection::Grid(grid) => crate::grid::grid_nodes(nodes, grid),
        }
    }

    pub fn text_content(&self, nodes: &NodeMap) -> ModelResult<String> {
        match self {
            Selection::Range(range) => range.text_content(nodes),
            Selection::Node(node) => Ok(node.text_content(nodes)),
            Selection::Grid(grid) => crate::grid::grid_text_content(nodes, grid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementCapabilities, ElementNode};
    use crate::node::tags;
    use crate::{Node, TextNode};

    fn attach(map: &mut NodeMap, parent: &str, node: Node) {
        let parent_key = NodeKey::from(parent);
        let key = node.key.clone();
        let mut node = node;
        node.parent = Some(parent_key.clone());
        map.insert(node);
        if let Some(element) = map.make_mut(&parent_key).and_then(Node::as_element_mut) {
            element.children.push(key);
        }
    }

    fn paragraph(key: &str) -> Node {
        Node::new(
            NodeKey::from(key),
            tags::PARAGRAPH,
            NodeKind::Element(ElementNode::new(ElementCapabilities::BLOCK)),
        )
    }

    fn doc() -> NodeMap {
        let mut map = NodeMap::new();
        map.insert(Node::new(
            NodeKey::root(),
            tags::ROOT,
            NodeKind::Element(ElementNode::new(ElementCapabilities::BLOCK)),
        ));
        attach(&mut map, "root", paragraph("p1"));
        attach(&mut map, "p1", Node::text("a".into(), TextNode::new("Hello")));
        attach(&mut map, "p1", Node::line_break("br".into()));
        attach(&mut map, "p1", Node::text("b".into(), TextNode::new("there")));
        attach(&mut map, "root", paragraph("p2"));
        attach(&mut map, "p2", Node::text("c".into(), TextNode::new("World")));
        attach(&mut map, "root", paragraph("empty"));
        map
    }

    #[test]
    fn test_backward_selection_swaps_start_and_end() {
        let map = doc();
        let selection = RangeSelection::new(Point::text("c", 2), Point::text("a", 1));
        assert!(selection.is_backward(&map).unwrap());
        let (start, end) = selection.start_end(&map).unwrap();
        assert_eq!(start, Point::text("a", 1));
        assert_eq!(end, Point::text("c", 2));
    }

    #[test]
    fn test_element_point_orders_after_earlier_children() {
        let map = doc();
        let inside_first = Point::text("a", 3);
        let after_first = Point::element("p1", 1);
        assert_eq!(
            compare_points(&map, &inside_first, &after_first).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_normalize_descends_to_text() {
        let map = doc();
        assert_eq!(
            normalize_point(&map, &Point::element("root", 0)).unwrap(),
            Point::text("a", 0)
        );
        assert_eq!(
            normalize_point(&map, &Point::element("p2", 1)).unwrap(),
            Point::text("c", 5)
        );
        assert_eq!(
            normalize_point(&map, &Point::text("c", 99)).unwrap(),
            Point::text("c", 5)
        );
        assert_eq!(
            normalize_point(&map, &Point::element("empty", 3)).unwrap(),
            Point::element("empty", 0)
        );
    }

    #[test]
    fn test_point_after_removal_prefers_next_sibling() {
        let map = doc();
        let p1 = NodeKey::from("p1");
        assert_eq!(point_after_removal(&map, &p1, 1).unwrap(), Point::element("p1", 1));
        assert_eq!(point_after_removal(&map, &p1, 2).unwrap(), Point::text("b", 0));
        assert_eq!(point_after_removal(&map, &p1, 3).unwrap(), Point::text("b", 5));
        assert!(matches!(
            point_after_removal(&map, &NodeKey::from("gone"), 0),
            Err(ModelError::SelectionLost)
        ));
    }

    #[test]
    fn test_range_text_content_across_blocks() {
        let map = doc();
        let selection = RangeSelection::new(Point::text("a", 1), Point::text("c", 3));
        assert_eq!(selection.text_content(&map).unwrap(), "ello\nthere\nWor");
        assert_eq!(
            selection.get_nodes(&map).unwrap(),
            vec!["a", "br", "b", "p2", "c"]
                .into_iter()
                .map(NodeKey::from)
                .collect::<Vec<_>>()
        );
    }
}
