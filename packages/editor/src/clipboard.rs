//! Selection extraction for the clipboard
//!
//! [`clone_selected_content`] copies the selected part of a state into a
//! standalone node map. Boundary text nodes are trimmed to the selected
//! characters. `range` lists the top-most copied nodes in document order,
//! which is what an HTML or JSON serializer walks.

use crate::EditorResult;
use std::collections::HashSet;
use tessera_html::{export_html, ExportOptions};
use tessera_model::{
    grid_nodes, normalize_point, point_at_end, point_at_start, EditorState, GridSelection, Node, NodeKey,
    NodeKind, NodeMap, NodeSelection, Point, RangeSelection, Selection,
};

/// Copied nodes keyed by their original keys.
#[derive(Debug, Clone)]
pub struct ClonedContent {
    /// Top-most copied nodes, in document order.
    pub range: Vec<NodeKey>,
    pub node_map: NodeMap,
}

impl ClonedContent {
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}

pub fn clone_selected_content(state: &EditorState, selection: &Selection) -> EditorResult<ClonedContent> {
    match selection {
        Selection::Range(range) => clone_range(&state.nodes, range),
        Selection::Node(node_selection) => Ok(clone_nodes(&state.nodes, node_selection)),
        Selection::Grid(grid) => clone_grid(&state.nodes, grid),
    }
}

/// Render the selected content as an HTML fragment.
pub fn convert_selection_to_html(state: &EditorState, selection: &Selection) -> EditorResult<String> {
    let content = clone_selected_content(state, selection)?;
    Ok(export_html(&content.node_map, &content.range, ExportOptions::default())?)
}

fn clone_range(nodes: &NodeMap, range: &RangeSelection) -> EditorResult<ClonedContent> {
    let (start, end) = range.start_end(nodes)?;
    let start = normalize_point(nodes, &start)?;
    let end = normalize_point(nodes, &end)?;
    let selected = range.get_nodes(nodes)?;
    let common = nodes
        .common_ancestor(&start.key, &end.key)
        .unwrap_or_else(NodeKey::root);

    let mut touched = selected.clone();
    if let Some(first) = selected.first() {
        touched.extend(
            nodes
                .ancestors(first)
                .into_iter()
                .take_while(|ancestor| *ancestor != common && nodes.is_ancestor_of(&common, ancestor)),
        );
    }
    let keep_common = includes_common_ancestor(nodes, &common, &start, &end)?;
    if keep_common && !touched.contains(&common) {
        touched.push(common.clone());
    }
    touched.sort_by_cached_key(|key| nodes.path(key));
    touched.dedup();

    // Boundary text that contributes no characters is left out.
    let trim = |key: &NodeKey, node: &Node| -> Option<(usize, usize)> {
        let text = node.as_text()?;
        let from = if *key == start.key && start.is_text() { start.offset } else { 0 };
        let to = if *key == end.key && end.is_text() { end.offset } else { text.len() };
        Some((from, to))
    };
    let included: Vec<NodeKey> = touched
        .into_iter()
        .filter(|key| match nodes.get(key) {
            Some(node) => match trim(key, node) {
                Some((from, to)) => from < to || node.as_text().is_some_and(|text| text.is_empty()),
                None => true,
            },
            None => false,
        })
        .collect();

    let range_keys = if keep_common {
        vec![common.clone()]
    } else {
        included
            .iter()
            .filter(|key| nodes.get(key).and_then(|node| node.parent.as_ref()) == Some(&common))
            .cloned()
            .collect()
    };

    let set: HashSet<&NodeKey> = included.iter().collect();
    let mut node_map = NodeMap::new();
    for key in &included {
        let Some(node) = nodes.get(key) else {
            continue;
        };
        let mut copy = node.clone();
        if let Some((from, to)) = trim(key, node) {
            if let NodeKind::Text(text) = &mut copy.kind {
                text.text = node.as_text().map(|t| t.slice(from, to)).unwrap_or_default();
            }
        }
        finish_copy(&mut copy, &set);
        node_map.insert(copy);
    }

    Ok(ClonedContent {
        range: range_keys,
        node_map,
    })
}

/// Whether the common ancestor of a range is copied itself, or only the
/// children the range touches.
fn includes_common_ancestor(nodes: &NodeMap, common: &NodeKey, start: &Point, end: &Point) -> EditorResult<bool> {
    let node = nodes.node(common)?;
    if node.is_shadow_root() {
        return Ok(false);
    }
    let Some(element) = node.as_element() else {
        // A single text node: the trimmed copy is the whole range.
        return Ok(true);
    };
    let holds_inline = element
        .children
        .iter()
        .all(|child| nodes.get(child).is_some_and(Node::is_inline));
    if !holds_inline {
        return Ok(true);
    }
    let covered = normalize_point(nodes, &point_at_start(nodes, common)?)? == *start
        && normalize_point(nodes, &point_at_end(nodes, common)?)? == *end;
    Ok(covered)
}

fn clone_nodes(nodes: &NodeMap, selection: &NodeSelection) -> ClonedContent {
    let selected: HashSet<&NodeKey> = selection.keys.iter().collect();
    let mut top: Vec<NodeKey> = selection
        .keys
        .iter()
        .filter(|key| nodes.contains(key))
        .filter(|key| !nodes.ancestors(key).iter().any(|ancestor| selected.contains(ancestor)))
        .cloned()
        .collect();
    top.sort_by_cached_key(|key| nodes.path(key));

    let included: Vec<NodeKey> = top.iter().flat_map(|key| nodes.subtree(key)).collect();
    ClonedContent {
        range: top,
        node_map: copy_all(nodes, &included),
    }
}

fn clone_grid(nodes: &NodeMap, selection: &GridSelection) -> EditorResult<ClonedContent> {
    let included = grid_nodes(nodes, selection)?;
    Ok(ClonedContent {
        range: vec![selection.grid_key.clone()],
        node_map: copy_all(nodes, &included),
    })
}

fn copy_all(nodes: &NodeMap, keys: &[NodeKey]) -> NodeMap {
    let set: HashSet<&NodeKey> = keys.iter().collect();
    let mut node_map = NodeMap::new();
    for key in keys {
        if let Some(node) = nodes.get(key) {
            let mut copy = node.clone();
            finish_copy(&mut copy, &set);
            node_map.insert(copy);
        }
    }
    node_map
}

/// Drop edges that point outside the copied set.
fn finish_copy(copy: &mut Node, set: &HashSet<&NodeKey>) {
    if copy.parent.as_ref().is_some_and(|parent| !set.contains(parent)) {
        copy.parent = None;
    }
    if let Some(element) = copy.as_element_mut() {
        element.children.retain(|child| set.contains(child));
    }
}
