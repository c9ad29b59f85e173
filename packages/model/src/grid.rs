//! Rectangular closure of a grid selection
//!
//! Rows and columns are addressed by child index: a table's children are
//! rows, a row's children are cells. Cell spans are not taken into account,
//! and a row shorter than the selected column range contributes only the
//! cells it has.

use crate::selection::GridSelection;
use crate::{ModelError, ModelResult, NodeKey, NodeMap};
use std::collections::HashSet;

/// Row and column index of a cell inside `grid`.
pub fn cell_coordinates(nodes: &NodeMap, grid: &NodeKey, cell: &NodeKey) -> ModelResult<(usize, usize)> {
    let row = nodes
        .node(cell)?
        .parent
        .clone()
        .ok_or_else(|| ModelError::invalid_structure(format!("cell {cell} has no row")))?;
    if nodes.node(&row)?.parent.as_ref() != Some(grid) {
        return Err(ModelError::invalid_structure(format!(
            "cell {cell} is not part of grid {grid}"
        )));
    }
    let column = nodes
        .index_in_parent(cell)
        .ok_or_else(|| ModelError::not_found(cell))?;
    let row_index = nodes
        .index_in_parent(&row)
        .ok_or_else(|| ModelError::not_found(&row))?;
    Ok((row_index, column))
}

/// Index bounds `(rows, columns)` covered by the selection, both inclusive.
pub fn grid_bounds(
    nodes: &NodeMap,
    selection: &GridSelection,
) -> ModelResult<((usize, usize), (usize, usize))> {
    let (anchor_row, anchor_col) = cell_coordinates(nodes, &selection.grid_key, &selection.anchor_cell)?;
    let (focus_row, focus_col) = cell_coordinates(nodes, &selection.grid_key, &selection.focus_cell)?;
    Ok((
        (anchor_row.min(focus_row), anchor_row.max(focus_row)),
        (anchor_col.min(focus_col), anchor_col.max(focus_col)),
    ))
}

/// The table, every row in the row range, and every cell in the column range
/// together with its whole subtree. Deduplicated, in document order.
pub fn grid_nodes(nodes: &NodeMap, selection: &GridSelection) -> ModelResult<Vec<NodeKey>> {
    let ((row_start, row_end), (col_start, col_end)) = grid_bounds(nodes, selection)?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |key: NodeKey| {
        if seen.insert(key.clone()) {
            out.push(key);
        }
    };

    push(selection.grid_key.clone());
    let rows = nodes.children(&selection.grid_key);
    for row in rows.iter().take(row_end + 1).skip(row_start) {
        push(row.clone());
        for cell in nodes.children(row).iter().take(col_end + 1).skip(col_start) {
            for key in nodes.subtree(cell) {
                push(key);
            }
        }
    }
    Ok(out)
}

/// Cells joined by tabs, rows by newlines.
pub fn grid_text_content(nodes: &NodeMap, selection: &GridSelection) -> ModelResult<String> {
    let ((row_start, row_end), (col_start, col_end)) = grid_bounds(nodes, selection)?;
    let rows = nodes.children(&selection.grid_key);
    let lines: Vec<String> = rows
        .iter()
        .take(row_end + 1)
        .skip(row_start)
        .map(|row| {
            nodes
                .children(row)
                .iter()
                .take(col_end + 1)
                .skip(col_start)
                .map(|cell| nodes.text_content(cell))
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect();
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementCapabilities, ElementNode};
    use crate::node::tags;
    use crate::{Node, NodeKind, TextNode};

    fn element(map: &mut NodeMap, key: &str, tag: &str, parent: Option<&str>) {
        let mut node = Node::new(
            NodeKey::from(key),
            tag,
            NodeKind::Element(ElementNode::new(ElementCapabilities::BLOCK)),
        );
        node.parent = parent.map(NodeKey::from);
        map.insert(node);
        if let Some(parent) = parent {
            if let Some(el) = map.make_mut(&NodeKey::from(parent)).and_then(Node::as_element_mut) {
                el.children.push(NodeKey::from(key));
            }
        }
    }

    fn table(rows: usize, cols: usize) -> NodeMap {
        let mut map = NodeMap::new();
        element(&mut map, "root", tags::ROOT, None);
        element(&mut map, "t", tags::TABLE, Some("root"));
        for r in 0..rows {
            let row = format!("r{r}");
            element(&mut map, &row, tags::TABLE_ROW, Some("t"));
            for c in 0..cols {
                let cell = format!("c{r}{c}");
                let para = format!("p{r}{c}");
                element(&mut map, &cell, tags::TABLE_CELL, Some(&row));
                element(&mut map, &para, tags::PARAGRAPH, Some(&cell));
                let mut text = Node::text(NodeKey::from(format!("x{r}{c}")), TextNode::new(format!("{r}{c}")));
                text.parent = Some(NodeKey::from(para.as_str()));
                let text_key = text.key.clone();
                map.insert(text);
                if let Some(el) = map.make_mut(&NodeKey::from(para)).and_then(Node::as_element_mut) {
                    el.children.push(text_key);
                }
            }
        }
        map
    }

    #[test]
    fn test_two_by_two_closure() {
        let map = table(3, 3);
        let selection = GridSelection::new("t".into(), "c11".into(), "c00".into());
        let keys = grid_nodes(&map, &selection).unwrap();
        assert_eq!(keys.len(), 15);
        assert_eq!(keys[0], NodeKey::from("t"));
        assert!(keys.contains(&NodeKey::from("x11")));
        assert!(!keys.contains(&NodeKey::from("c22")));
        assert_eq!(grid_text_content(&map, &selection).unwrap(), "00\t01\n10\t11");
    }

    #[test]
    fn test_cell_outside_grid_is_rejected() {
        let map = table(2, 2);
        let selection = GridSelection::new("r0".into(), "c00".into(), "c11".into());
        assert!(matches!(
            grid_nodes(&map, &selection),
            Err(ModelError::InvalidStructure(_))
        ));
    }
}
