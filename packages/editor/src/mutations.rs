//! # Structural Mutations
//!
//! Tree edits on a write transaction. Every edit writes through
//! [`Txn::get_writable`], keeps parent and child lists in agreement, and
//! carries the selection along:
//!
//! - inserting before an element point's offset shifts the offset right
//! - removing a node moves points inside it to the start of the next
//!   sibling, else the end of the previous sibling, else the parent
//! - splitting or merging text moves text points onto the node that now
//!   holds their character
//!
//! Edits that would detach the root, create a cycle, or give children to a
//! leaf fail with `InvalidStructure` before touching the draft.

use crate::transaction::root_caret;
use crate::{EditorResult, Txn};
use serde_json::Value;
use tessera_model::{
    point_after_removal, point_at_start, Direction, ElementFormat, ModelError, NodeKey, Point,
    Selection, TextDetail, TextFormat, TextMode,
};
use tracing::warn;

impl<'a> Txn<'a> {
    /// Insert `child` as the last child of `parent`, detaching it from
    /// wherever it was.
    pub fn append(&mut self, parent: &NodeKey, child: &NodeKey) -> EditorResult<()> {
        let index = self
            .element(parent)?
            .children
            .iter()
            .filter(|key| *key != child)
            .count();
        self.insert_at(parent, index, child)
    }

    /// Insert `child` at `index` of `parent`'s children. `index` counts the
    /// children after `child` was detached.
    pub fn insert_at(&mut self, parent: &NodeKey, index: usize, child: &NodeKey) -> EditorResult<()> {
        self.check_insert(parent, child)?;
        let size = self
            .element(parent)?
            .children
            .iter()
            .filter(|key| *key != child)
            .count();
        if index > size {
            return Err(ModelError::invalid_offset(index, size).into());
        }

        self.detach(child)?;
        self.writable_element(parent)?.children.insert(index, child.clone());
        self.get_writable(child)?.parent = Some(parent.clone());
        self.shift_element_points(parent, index, true)
    }

    pub fn insert_before(&mut self, target: &NodeKey, node: &NodeKey) -> EditorResult<()> {
        if target == node {
            return Ok(());
        }
        let parent = self.attached_parent(target)?;
        self.check_insert(&parent, node)?;
        self.detach(node)?;
        let index = self.index_of(target)?;
        self.insert_at(&parent, index, node)
    }

    pub fn insert_after(&mut self, target: &NodeKey, node: &NodeKey) -> EditorResult<()> {
        if target == node {
            return Ok(());
        }
        let parent = self.attached_parent(target)?;
        self.check_insert(&parent, node)?;
        self.detach(node)?;
        let index = self.index_of(target)?;
        self.insert_at(&parent, index + 1, node)
    }

    /// Detach `key` from its parent. The subtree stays in the draft until
    /// commit, so it may be inserted again in the same transaction.
    ///
    /// A parent that cannot be empty is removed along with its last child.
    pub fn remove(&mut self, key: &NodeKey) -> EditorResult<()> {
        self.remove_node(key, true, true)
    }

    /// Replace `old` with `new` at the same position. Selection points inside
    /// `old` move to the start of `new`.
    pub fn replace(&mut self, old: &NodeKey, new: &NodeKey) -> EditorResult<()> {
        if old == new {
            return Ok(());
        }
        let parent = self.attached_parent(old)?;
        self.check_insert(&parent, new)?;
        self.detach(new)?;
        let index = self.index_of(old)?;
        self.insert_at(&parent, index, new)?;

        let start = point_at_start(self.nodes(), new)?;
        let old_key = old.clone();
        self.update_points(|nodes, point| {
            (point.key == old_key || nodes.is_ancestor_of(&old_key, &point.key)).then(|| start.clone())
        })?;
        self.remove(old)
    }

    /// Remove every child of `key`. The element itself stays even if it
    /// cannot be empty.
    pub fn clear_children(&mut self, key: &NodeKey) -> EditorResult<()> {
        for child in self.children(key) {
            self.remove_node(&child, true, false)?;
        }
        Ok(())
    }

    /// Split a text node at character `offsets`. The first part keeps the
    /// original key; the others are new siblings with the same format, mode,
    /// detail and style. Offsets at either end produce no empty part.
    pub fn split_text(&mut self, key: &NodeKey, offsets: &[usize]) -> EditorResult<Vec<NodeKey>> {
        let text = self.text(key)?.clone();
        let size = text.len();
        let mut previous: Option<usize> = None;
        for &offset in offsets {
            if offset > size || previous.is_some_and(|p| offset <= p) {
                return Err(ModelError::invalid_offset(offset, size).into());
            }
            previous = Some(offset);
        }
        if !text.is_simple() {
            return Err(ModelError::invalid_structure(format!(
                "{key} is a {:?} text node and cannot be split",
                text.mode
            ))
            .into());
        }

        let mut bounds = vec![0];
        bounds.extend(offsets.iter().copied().filter(|o| *o > 0 && *o < size));
        bounds.push(size);
        if bounds.len() == 2 {
            return Ok(vec![key.clone()]);
        }

        let parts: Vec<String> = bounds.windows(2).map(|w| text.slice(w[0], w[1])).collect();
        self.writable_text(key)?.text = parts[0].clone();
        let attached = self.parent(key).is_some();
        let mut keys = vec![key.clone()];
        for part in &parts[1..] {
            let mut node = text.clone();
            node.text = part.clone();
            let new_key = self.create_text_node(node)?;
            if attached {
                let last = keys[keys.len() - 1].clone();
                self.insert_after(&last, &new_key)?;
            }
            keys.push(new_key);
        }

        // A point on a split boundary stays at the end of the earlier part.
        self.update_points(|_, point| {
            if !point.is_text() || point.key != *key {
                return None;
            }
            let part = bounds[1..bounds.len() - 1]
                .iter()
                .filter(|bound| **bound < point.offset)
                .count();
            Some(Point::text(keys[part].clone(), point.offset - bounds[part]))
        })?;
        Ok(keys)
    }

    /// Merge the text node `key` with its next sibling (or previous sibling
    /// when `backward`). Returns the key of the merged node, which is always
    /// the earlier of the two. Both nodes must be simple text with the same
    /// format and style.
    pub fn merge_with_sibling(&mut self, key: &NodeKey, backward: bool) -> EditorResult<NodeKey> {
        let sibling = if backward {
            self.nodes().previous_sibling(key)
        } else {
            self.nodes().next_sibling(key)
        }
        .cloned()
        .ok_or_else(|| ModelError::invalid_structure(format!("{key} has no sibling to merge with")))?;
        let (target, source) = if backward {
            (sibling, key.clone())
        } else {
            (key.clone(), sibling)
        };

        if !self.text(&target)?.can_merge_with(self.text(&source)?) {
            return Err(ModelError::invalid_structure(format!("{target} and {source} cannot be merged")).into());
        }

        let target_len = self.text(&target)?.len();
        let source_text = self.text(&source)?.text.clone();
        self.writable_text(&target)?.text.push_str(&source_text);
        self.update_points(|_, point| {
            (point.is_text() && point.key == source)
                .then(|| Point::text(target.clone(), target_len + point.offset))
        })?;
        self.remove_node(&source, false, false)?;
        Ok(target)
    }

    /// Replace the whole text of a node. Points past the new end are clamped.
    pub fn set_text(&mut self, key: &NodeKey, text: impl Into<String>) -> EditorResult<()> {
        let text = text.into();
        let len = text.chars().count();
        self.writable_text(key)?.text = text;
        self.update_points(|_, point| {
            (point.is_text() && point.key == *key && point.offset > len).then(|| Point::text(key.clone(), len))
        })
    }

    /// Replace `delete_count` characters at `offset` with `insert`. Points
    /// after the edit shift; points inside the deleted span collapse to its
    /// start.
    pub fn splice_text(
        &mut self,
        key: &NodeKey,
        offset: usize,
        delete_count: usize,
        insert: &str,
    ) -> EditorResult<()> {
        let size = self.text(key)?.len();
        let end = offset + delete_count;
        if end > size {
            return Err(ModelError::invalid_offset(end, size).into());
        }
        self.writable_text(key)?.splice(offset, delete_count, insert);

        let inserted = insert.chars().count();
        self.update_points(|_, point| {
            if !point.is_text() || point.key != *key || point.offset <= offset {
                return None;
            }
            if point.offset >= end {
                Some(Point::text(key.clone(), point.offset - delete_count + inserted))
            } else {
                Some(Point::text(key.clone(), offset))
            }
        })
    }

    pub fn set_format(&mut self, key: &NodeKey, format: TextFormat) -> EditorResult<()> {
        self.writable_text(key)?.format = format;
        Ok(())
    }

    pub fn toggle_format(&mut self, key: &NodeKey, flag: TextFormat) -> EditorResult<()> {
        let text = self.writable_text(key)?;
        text.format = text.format.toggled(flag);
        Ok(())
    }

    pub fn set_mode(&mut self, key: &NodeKey, mode: TextMode) -> EditorResult<()> {
        self.writable_text(key)?.mode = mode;
        Ok(())
    }

    pub fn set_detail(&mut self, key: &NodeKey, detail: TextDetail) -> EditorResult<()> {
        self.writable_text(key)?.detail = detail;
        Ok(())
    }

    pub fn set_style(&mut self, key: &NodeKey, style: impl Into<String>) -> EditorResult<()> {
        self.writable_text(key)?.style = style.into();
        Ok(())
    }

    pub fn set_indent(&mut self, key: &NodeKey, indent: u32) -> EditorResult<()> {
        self.writable_element(key)?.indent = indent;
        Ok(())
    }

    pub fn set_direction(&mut self, key: &NodeKey, direction: Option<Direction>) -> EditorResult<()> {
        self.writable_element(key)?.direction = direction;
        Ok(())
    }

    pub fn set_element_format(&mut self, key: &NodeKey, format: ElementFormat) -> EditorResult<()> {
        self.writable_element(key)?.format = format;
        Ok(())
    }

    /// Set a type-specific field on an element or decorator.
    pub fn set_prop(&mut self, key: &NodeKey, name: &str, value: Value) -> EditorResult<()> {
        let props = self
            .get_writable(key)?
            .props_mut()
            .ok_or_else(|| ModelError::invalid_structure(format!("{key} has no properties")))?;
        props.insert(name.to_string(), value);
        Ok(())
    }

    fn check_insert(&self, parent: &NodeKey, child: &NodeKey) -> EditorResult<()> {
        if !self.node(parent)?.is_element() {
            return Err(ModelError::invalid_structure(format!("{parent} cannot have children")).into());
        }
        if self.node(child)?.is_root() {
            return Err(ModelError::invalid_structure("the root cannot be inserted").into());
        }
        if child == parent || self.nodes().is_ancestor_of(child, parent) {
            return Err(ModelError::invalid_structure(format!(
                "inserting {child} under {parent} would create a cycle"
            ))
            .into());
        }
        Ok(())
    }

    fn attached_parent(&self, key: &NodeKey) -> EditorResult<NodeKey> {
        if key.is_root() {
            return Err(ModelError::invalid_structure("the root has no siblings").into());
        }
        self.parent(key)
            .ok_or_else(|| ModelError::invalid_structure(format!("{key} has no parent")).into())
    }

    fn index_of(&self, key: &NodeKey) -> EditorResult<usize> {
        self.nodes().index_in_parent(key).ok_or_else(|| {
            ModelError::invalid_structure(format!("{key} is not listed by its parent")).into()
        })
    }

    /// Unlink `key` from its parent. Returns where it was.
    pub(crate) fn detach(&mut self, key: &NodeKey) -> EditorResult<Option<(NodeKey, usize)>> {
        let Some(parent) = self.parent(key) else {
            return Ok(None);
        };
        let index = self.index_of(key)?;
        self.writable_element(&parent)?.children.remove(index);
        self.get_writable(key)?.parent = None;
        self.shift_element_points(&parent, index, false)?;
        Ok(Some((parent, index)))
    }

    fn shift_element_points(&mut self, parent: &NodeKey, index: usize, inserted: bool) -> EditorResult<()> {
        self.update_points(|_, point| {
            if point.is_text() || point.key != *parent || point.offset <= index {
                return None;
            }
            let offset = if inserted { point.offset + 1 } else { point.offset - 1 };
            Some(Point::element(parent.clone(), offset))
        })
    }

    pub(crate) fn remove_node(&mut self, key: &NodeKey, repair: bool, prune: bool) -> EditorResult<()> {
        if key.is_root() {
            return Err(ModelError::invalid_structure("the root cannot be removed").into());
        }
        self.mark_dirty(key)?;
        let Some((parent, index)) = self.detach(key)? else {
            return Ok(());
        };
        if repair {
            self.repair_after_removal(key, &parent, index)?;
        }

        let parent_node = self.node(&parent)?;
        let empty_and_required = !parent_node.is_root()
            && parent_node
                .as_element()
                .is_some_and(|element| element.is_empty() && !element.can_be_empty());
        if prune && empty_and_required {
            self.remove_node(&parent, repair, prune)?;
        }
        Ok(())
    }

    fn repair_after_removal(&mut self, removed: &NodeKey, parent: &NodeKey, index: usize) -> EditorResult<()> {
        let tessera_model::EditorState { nodes, selection } = self.draft_mut()?;
        let Some(current) = selection.as_mut() else {
            return Ok(());
        };
        let inside = |key: &NodeKey| key == removed || nodes.is_ancestor_of(removed, key);
        let fallback = || {
            point_after_removal(nodes, parent, index).unwrap_or_else(|_| {
                warn!(removed = %removed, "no point left next to a removed node, falling back to the root");
                root_caret(nodes)
            })
        };

        let collapse = match current {
            Selection::Range(range) => {
                for point in [&mut range.anchor, &mut range.focus] {
                    if inside(&point.key) {
                        *point = fallback();
                    }
                }
                false
            }
            Selection::Node(node_selection) => {
                node_selection.keys.retain(|key| !inside(key));
                node_selection.is_empty()
            }
            Selection::Grid(grid) => {
                inside(&grid.grid_key) || inside(&grid.anchor_cell) || inside(&grid.focus_cell)
            }
        };
        if collapse {
            *current = Selection::caret(fallback());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{EditorResult, Txn};
    use tessera_model::{
        EditorState, KeyGenerator, NodeKey, NodeRegistry, Point, Selection, TextFormat,
    };

    fn with_txn(f: impl FnOnce(&mut Txn<'_>) -> EditorResult<()>) {
        let registry = NodeRegistry::with_builtins();
        let mut keys = KeyGenerator::new();
        let mut txn = Txn::writable(EditorState::new(), &registry, &mut keys, Vec::new());
        f(&mut txn).unwrap();
        txn.nodes().validate().unwrap();
    }

    fn paragraph_with(txn: &mut Txn<'_>, texts: &[&str]) -> EditorResult<(NodeKey, Vec<NodeKey>)> {
        let paragraph = txn.create_paragraph()?;
        txn.append(&NodeKey::root(), &paragraph)?;
        let mut keys = Vec::new();
        for text in texts {
            let key = txn.create_text(*text)?;
            txn.append(&paragraph, &key)?;
            keys.push(key);
        }
        Ok((paragraph, keys))
    }

    #[test]
    fn test_insert_rejects_cycles_and_leaf_parents() {
        with_txn(|txn| {
            let (paragraph, texts) = paragraph_with(txn, &["a"])?;
            let quote = txn.create_node("quote")?;
            txn.append(&paragraph, &quote)?;

            assert!(txn.append(&quote, &paragraph).unwrap_err().is_invalid_structure());
            assert!(txn.append(&texts[0], &quote).unwrap_err().is_invalid_structure());
            assert!(txn.append(&paragraph, &NodeKey::root()).unwrap_err().is_invalid_structure());
            assert!(txn.remove(&NodeKey::root()).unwrap_err().is_invalid_structure());
            assert!(txn.insert_at(&paragraph, 9, &quote).unwrap_err().is_invalid_offset());
            Ok(())
        });
    }

    #[test]
    fn test_move_within_parent() {
        with_txn(|txn| {
            let (paragraph, texts) = paragraph_with(txn, &["a", "b", "c"])?;
            txn.set_format(&texts[1], TextFormat::BOLD)?;
            txn.append(&paragraph, &texts[0])?;
            assert_eq!(txn.children(&paragraph), vec![texts[1].clone(), texts[2].clone(), texts[0].clone()]);
            txn.insert_before(&texts[1], &texts[2])?;
            assert_eq!(txn.children(&paragraph), vec![texts[2].clone(), texts[1].clone(), texts[0].clone()]);
            Ok(())
        });
    }

    #[test]
    fn test_split_text_moves_points() {
        with_txn(|txn| {
            let (_, texts) = paragraph_with(txn, &["hello world"])?;
            txn.select(Point::text(texts[0].clone(), 2), Point::text(texts[0].clone(), 8))?;

            let parts = txn.split_text(&texts[0], &[0, 5, 6, 11])?;
            assert_eq!(parts.len(), 3);
            assert_eq!(parts[0], texts[0]);
            let joined: String = parts.iter().map(|k| txn.text(k).unwrap().text.clone()).collect();
            assert_eq!(joined, "hello world");

            let range = txn.range_selection().unwrap();
            assert_eq!(range.anchor, Point::text(parts[0].clone(), 2));
            assert_eq!(range.focus, Point::text(parts[2].clone(), 2));

            assert!(txn.split_text(&texts[0], &[3, 2]).unwrap_err().is_invalid_offset());
            assert!(txn.split_text(&texts[0], &[42]).unwrap_err().is_invalid_offset());
            Ok(())
        });
    }

    #[test]
    fn test_merge_restores_split() {
        with_txn(|txn| {
            let (paragraph, texts) = paragraph_with(txn, &["abcdef"])?;
            txn.set_format(&texts[0], TextFormat::ITALIC)?;
            let parts = txn.split_text(&texts[0], &[3])?;
            txn.select_end(&parts[1])?;

            let merged = txn.merge_with_sibling(&parts[1], true)?;
            assert_eq!(merged, texts[0]);
            assert_eq!(txn.children(&paragraph), vec![texts[0].clone()]);
            let text = txn.text(&merged)?;
            assert_eq!(text.text, "abcdef");
            assert_eq!(text.format, TextFormat::ITALIC);
            assert_eq!(txn.range_selection().unwrap().anchor, Point::text(merged.clone(), 6));
            Ok(())
        });
    }

    #[test]
    fn test_merge_rejects_incompatible_text() {
        with_txn(|txn| {
            let (paragraph, texts) = paragraph_with(txn, &["plain", "bold"])?;
            txn.set_format(&texts[1], TextFormat::BOLD)?;
            assert!(txn.merge_with_sibling(&texts[0], false).unwrap_err().is_invalid_structure());

            txn.set_format(&texts[1], TextFormat::empty())?;
            txn.set_style(&texts[1], "color: red")?;
            assert!(txn.merge_with_sibling(&texts[1], true).unwrap_err().is_invalid_structure());

            assert_eq!(txn.children(&paragraph), texts);
            assert_eq!(txn.text(&texts[0])?.text, "plain");
            Ok(())
        });
    }

    #[test]
    fn test_remove_repairs_caret() {
        with_txn(|txn| {
            let (paragraph, texts) = paragraph_with(txn, &["a", "b"])?;
            txn.select_end(&texts[1])?;
            txn.remove(&texts[1])?;
            assert_eq!(txn.range_selection().unwrap().anchor, Point::text(texts[0].clone(), 1));

            txn.select_start(&texts[0])?;
            txn.remove(&texts[0])?;
            assert_eq!(txn.range_selection().unwrap().anchor, Point::element(paragraph.clone(), 0));

            txn.remove(&paragraph)?;
            assert_eq!(txn.range_selection().unwrap().anchor, Point::element(NodeKey::root(), 0));
            Ok(())
        });
    }

    #[test]
    fn test_removing_last_item_prunes_list() {
        with_txn(|txn| {
            let list = txn.create_node("list")?;
            txn.append(&NodeKey::root(), &list)?;
            let item = txn.create_node("listitem")?;
            txn.append(&list, &item)?;
            txn.remove(&item)?;
            assert!(txn.nodes().children(&NodeKey::root()).is_empty());
            assert!(!txn.nodes().is_attached(&list));
            Ok(())
        });
    }

    #[test]
    fn test_node_selection_drops_removed_keys() {
        with_txn(|txn| {
            let (paragraph, texts) = paragraph_with(txn, &["a", "b"])?;
            txn.select_nodes([texts[0].clone(), texts[1].clone()])?;
            txn.remove(&texts[0])?;
            match txn.selection() {
                Some(Selection::Node(selection)) => assert_eq!(selection.keys, vec![texts[1].clone()]),
                other => panic!("unexpected selection {other:?}"),
            }
            txn.remove(&texts[1])?;
            assert_eq!(
                txn.range_selection().unwrap().anchor,
                Point::element(paragraph.clone(), 0)
            );
            Ok(())
        });
    }

    #[test]
    fn test_splice_shifts_points() {
        with_txn(|txn| {
            let (_, texts) = paragraph_with(txn, &["hello"])?;
            txn.select(Point::text(texts[0].clone(), 1), Point::text(texts[0].clone(), 5))?;
            txn.splice_text(&texts[0], 1, 3, "EY")?;
            assert_eq!(txn.text(&texts[0])?.text, "hEYo");
            let range = txn.range_selection().unwrap();
            assert_eq!(range.anchor, Point::text(texts[0].clone(), 1));
            assert_eq!(range.focus, Point::text(texts[0].clone(), 4));
            assert!(txn.splice_text(&texts[0], 3, 5, "").unwrap_err().is_invalid_offset());
            Ok(())
        });
    }
}
