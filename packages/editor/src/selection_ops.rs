//! # Selection Operations
//!
//! Editing operations addressed through the current selection: typing,
//! deleting, formatting, inserting nodes and splitting blocks. They are the
//! default behaviour behind the built-in commands and can also be called
//! directly from a mutator.
//!
//! Direction-sensitive operations work on the logical (document-ordered)
//! start and end of a range, whatever its anchor and focus are.

use crate::{EditorResult, Txn};
use std::collections::HashSet;
use tessera_model::{
    grid_bounds, normalize_point, point_at_end, point_at_start, tags, GridSelection, ModelError, Node,
    NodeKey, NodeKind, Point, RangeSelection, Selection, TextFormat, TextNode,
};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Character,
    Word,
    Line,
}

/// Where a block split left the caret's block.
struct BlockSplit {
    parent: NodeKey,
    /// Index in `parent` right after the first half.
    index: usize,
    /// The second half, when the caret was strictly inside the block.
    created: Option<NodeKey>,
}

impl<'a> Txn<'a> {
    /// Logical start and end of the range selection, normalized.
    fn range_bounds(&self) -> EditorResult<(RangeSelection, Point, Point)> {
        let range = self
            .range_selection()
            .cloned()
            .ok_or(ModelError::SelectionLost)?;
        let (start, end) = range.start_end(self.nodes())?;
        let start = normalize_point(self.nodes(), &start)?;
        let end = normalize_point(self.nodes(), &end)?;
        Ok((range, start, end))
    }

    /// Delete the selected content. A range collapses to its start, a node
    /// selection removes its nodes, a grid selection empties its cells.
    pub fn remove_text(&mut self) -> EditorResult<()> {
        match self.selection().cloned() {
            None => Ok(()),
            Some(Selection::Node(_)) => self.delete_nodes(),
            Some(Selection::Grid(grid)) => self.clear_grid(&grid),
            Some(Selection::Range(range)) if range.is_collapsed() => Ok(()),
            Some(Selection::Range(_)) => {
                let (_, start, end) = self.range_bounds()?;
                self.remove_between(start, end)
            }
        }
    }

    fn remove_between(&mut self, start: Point, end: Point) -> EditorResult<()> {
        if start == end {
            return self.set_caret(start);
        }
        let start_block = self.nodes().nearest_block(&start.key);
        let end_block = self.nodes().nearest_block(&end.key);
        self.set_caret(start.clone())?;

        if start.key == end.key && start.is_text() {
            if self.text(&start.key)?.is_simple() {
                return self.splice_text(&start.key, start.offset, end.offset - start.offset, "");
            }
            return self.remove(&start.key);
        }

        let selected = RangeSelection::new(start.clone(), end.clone()).get_nodes(self.nodes())?;
        let mut keep: HashSet<NodeKey> = HashSet::new();
        for point in [&start, &end] {
            keep.insert(point.key.clone());
            keep.extend(self.nodes().ancestors(&point.key));
        }
        for key in &selected {
            if !keep.contains(key) && self.nodes().is_attached(key) {
                self.remove_node(key, true, false)?;
            }
        }

        if end.is_text() && end.offset > 0 {
            if self.text(&end.key)?.is_simple() {
                self.splice_text(&end.key, 0, end.offset, "")?;
            } else {
                self.remove(&end.key)?;
            }
        }
        if start.is_text() {
            let len = self.text(&start.key)?.len();
            if start.offset < len {
                if self.text(&start.key)?.is_simple() {
                    self.splice_text(&start.key, start.offset, len - start.offset, "")?;
                } else {
                    self.remove(&start.key)?;
                }
            }
        }

        if let (Some(first), Some(last)) = (start_block, end_block) {
            self.merge_blocks(&first, &last)?;
        }
        Ok(())
    }

    /// Move the children of `last` to the end of `first` and remove `last`,
    /// when both are still in the same shadow root and neither contains
    /// the other.
    fn merge_blocks(&mut self, first: &NodeKey, last: &NodeKey) -> EditorResult<()> {
        let nodes = self.nodes();
        if first == last
            || !nodes.is_attached(first)
            || !nodes.is_attached(last)
            || nodes.is_ancestor_of(first, last)
            || nodes.is_ancestor_of(last, first)
            || self.shadow_root_of(first) != self.shadow_root_of(last)
        {
            return Ok(());
        }
        for child in self.children(last) {
            self.append(first, &child)?;
        }
        self.remove(last)
    }

    fn shadow_root_of(&self, key: &NodeKey) -> Option<NodeKey> {
        self.nodes()
            .ancestors(key)
            .into_iter()
            .find(|ancestor| self.get(ancestor).is_some_and(Node::is_shadow_root))
    }

    /// Remove every node of a node selection.
    pub fn delete_nodes(&mut self) -> EditorResult<()> {
        let Some(Selection::Node(selection)) = self.selection().cloned() else {
            return Ok(());
        };
        for key in &selection.keys {
            if self.nodes().is_attached(key) {
                self.remove(key)?;
            }
        }
        Ok(())
    }

    /// Replace the content of every selected cell with an empty paragraph
    /// and put the caret in the anchor cell.
    fn clear_grid(&mut self, grid: &GridSelection) -> EditorResult<()> {
        let ((row_start, row_end), (col_start, col_end)) = grid_bounds(self.nodes(), grid)?;
        let rows = self.children(&grid.grid_key);
        for row in rows.iter().take(row_end + 1).skip(row_start) {
            for cell in self.children(row).into_iter().take(col_end + 1).skip(col_start) {
                self.clear_children(&cell)?;
                let paragraph = self.create_paragraph()?;
                self.append(&cell, &paragraph)?;
            }
        }
        self.select_start(&grid.anchor_cell)
    }

    /// Type `text` at the selection, replacing selected content.
    pub fn insert_text(&mut self, text: &str) -> EditorResult<()> {
        let collapsed = match self.selection() {
            None => return Err(ModelError::SelectionLost.into()),
            Some(selection) => selection.is_collapsed(),
        };
        if !collapsed {
            self.remove_text()?;
        }
        if text.is_empty() {
            return Ok(());
        }
        let (range, caret, _) = self.range_bounds()?;
        let inserted = text.chars().count();

        if caret.is_text() {
            let node = self.text(&caret.key)?.clone();
            if node.accepts_text() && node.format == range.format && node.style == range.style {
                self.splice_text(&caret.key, caret.offset, 0, text)?;
                return self.set_caret(Point::text(caret.key.clone(), caret.offset + inserted));
            }
            let mut fresh = TextNode::new(text).with_format(range.format);
            fresh.style = range.style.clone();
            let key = self.create_text_node(fresh)?;
            if caret.offset == 0 {
                self.insert_before(&caret.key, &key)?;
            } else if caret.offset >= node.len() || !node.is_simple() {
                self.insert_after(&caret.key, &key)?;
            } else {
                let parts = self.split_text(&caret.key, &[caret.offset])?;
                self.insert_after(&parts[0], &key)?;
            }
            return self.set_caret(Point::text(key, inserted));
        }

        let mut fresh = TextNode::new(text).with_format(range.format);
        fresh.style = range.style;
        let key = self.create_text_node(fresh)?;
        if self.node(&caret.key)?.is_shadow_root() {
            let paragraph = self.create_paragraph()?;
            self.append(&paragraph, &key)?;
            self.insert_at(&caret.key, caret.offset, &paragraph)?;
        } else {
            self.insert_at(&caret.key, caret.offset, &key)?;
        }
        self.set_caret(Point::text(key, inserted))
    }

    /// Delete one grapheme cluster next to a caret, or the selected content.
    pub fn delete_character(&mut self, backward: bool) -> EditorResult<()> {
        self.delete_unit(backward, Unit::Character)
    }

    /// Delete to the previous (or next) word boundary, skipping whitespace
    /// next to the caret first.
    pub fn delete_word(&mut self, backward: bool) -> EditorResult<()> {
        self.delete_unit(backward, Unit::Word)
    }

    /// Delete to the start (or end) of the visual line, i.e. up to the
    /// nearest line break or block edge.
    pub fn delete_line(&mut self, backward: bool) -> EditorResult<()> {
        self.delete_unit(backward, Unit::Line)
    }

    fn delete_unit(&mut self, backward: bool, unit: Unit) -> EditorResult<()> {
        let collapsed_range = matches!(self.selection(), Some(Selection::Range(range)) if range.is_collapsed());
        if !collapsed_range {
            return self.remove_text();
        }
        let (_, caret, _) = self.range_bounds()?;
        let Some(target) = self.moved_point(&caret, backward, unit)? else {
            return Ok(());
        };
        if backward {
            self.remove_between(target, caret)
        } else {
            self.remove_between(caret, target)
        }
    }

    fn moved_point(&self, caret: &Point, backward: bool, unit: Unit) -> EditorResult<Option<Point>> {
        if !caret.is_text() {
            let children = self.children(&caret.key);
            let neighbour = if backward {
                caret.offset.checked_sub(1).and_then(|i| children.get(i))
            } else {
                children.get(caret.offset)
            };
            return match neighbour {
                Some(child) => self.enter(child, backward, unit),
                None => self.cross(&caret.key, backward, unit),
            };
        }

        let text = self.text(&caret.key)?;
        let len = text.len();
        let at_edge = if backward { caret.offset == 0 } else { caret.offset >= len };
        if at_edge {
            return self.cross(&caret.key, backward, unit);
        }
        if unit == Unit::Line {
            return self.line_edge(&caret.key, backward).map(Some);
        }
        let offset = if text.is_token() || text.is_inert() {
            if backward {
                0
            } else {
                len
            }
        } else if text.is_segmented() {
            step(&text.text, caret.offset, backward, Unit::Word)
        } else {
            step(&text.text, caret.offset, backward, unit)
        };
        Ok(Some(Point::text(caret.key.clone(), offset)))
    }

    /// Step into `key` from the outside.
    fn enter(&self, key: &NodeKey, backward: bool, unit: Unit) -> EditorResult<Option<Point>> {
        let leaf = if backward {
            self.nodes().last_leaf(key)
        } else {
            self.nodes().first_leaf(key)
        };
        let node = self.node(&leaf)?;
        match &node.kind {
            NodeKind::Text(text) if text.is_empty() => self.cross(&leaf, backward, unit),
            NodeKind::Text(text) => {
                let from = Point::text(leaf.clone(), if backward { text.len() } else { 0 });
                self.moved_point(&from, backward, unit)
            }
            NodeKind::Element(_) if node.is_block() => Ok(Some(if backward {
                point_at_end(self.nodes(), &leaf)?
            } else {
                point_at_start(self.nodes(), &leaf)?
            })),
            NodeKind::Element(_) => self.cross(&leaf, backward, unit),
            NodeKind::LineBreak | NodeKind::Decorator(_) => {
                let parent = self
                    .parent(&leaf)
                    .ok_or_else(|| ModelError::invalid_structure(format!("{leaf} has no parent")))?;
                let index = self
                    .nodes()
                    .index_in_parent(&leaf)
                    .ok_or_else(|| ModelError::not_found(&leaf))?;
                Ok(Some(Point::element(parent, if backward { index } else { index + 1 })))
            }
        }
    }

    /// Leave `key` through its edge: into the neighbouring inline node, or
    /// to the edge of the neighbouring block.
    fn cross(&self, key: &NodeKey, backward: bool, unit: Unit) -> EditorResult<Option<Point>> {
        if let Some(neighbour) = self.inline_neighbour(key, backward) {
            return self.enter(&neighbour, backward, unit);
        }
        let Some(block) = self.nodes().nearest_block(key) else {
            return Ok(None);
        };
        let Some(other) = self.adjacent_block(&block, backward) else {
            return Ok(None);
        };
        let point = if backward {
            point_at_end(self.nodes(), &other)?
        } else {
            point_at_start(self.nodes(), &other)?
        };
        Ok(Some(normalize_point(self.nodes(), &point)?))
    }

    /// The next inline sibling of `key` or of its inline ancestors, staying
    /// inside the nearest block.
    fn inline_neighbour(&self, key: &NodeKey, backward: bool) -> Option<NodeKey> {
        let mut current = key.clone();
        loop {
            let node = self.get(&current)?;
            if node.is_block() || node.is_shadow_root() {
                return None;
            }
            let sibling = if backward {
                self.nodes().previous_sibling(&current)
            } else {
                self.nodes().next_sibling(&current)
            };
            if let Some(sibling) = sibling {
                return Some(sibling.clone());
            }
            current = node.parent.clone()?;
        }
    }

    /// The block before (or after) `block` in document order, within the
    /// same shadow root.
    fn adjacent_block(&self, block: &NodeKey, backward: bool) -> Option<NodeKey> {
        let mut current = block.clone();
        loop {
            let sibling = if backward {
                self.nodes().previous_sibling(&current)
            } else {
                self.nodes().next_sibling(&current)
            };
            if let Some(sibling) = sibling {
                let leaf = if backward {
                    self.nodes().last_leaf(sibling)
                } else {
                    self.nodes().first_leaf(sibling)
                };
                return self.nodes().nearest_block(&leaf);
            }
            let parent = self.parent(&current)?;
            if self.get(&parent)?.is_shadow_root() {
                return None;
            }
            current = parent;
        }
    }

    /// First (or last) position of the line holding `key`.
    fn line_edge(&self, key: &NodeKey, backward: bool) -> EditorResult<Point> {
        let mut current = key.clone();
        while let Some(neighbour) = self.inline_neighbour(&current, backward) {
            let leaf = if backward {
                self.nodes().last_leaf(&neighbour)
            } else {
                self.nodes().first_leaf(&neighbour)
            };
            if self.node(&leaf)?.is_line_break() {
                break;
            }
            current = leaf;
        }
        let point = if backward {
            point_at_start(self.nodes(), &current)?
        } else {
            point_at_end(self.nodes(), &current)?
        };
        Ok(point)
    }

    /// Toggle `flag` over the selection. A caret toggles the typing format;
    /// a range splits its boundary text nodes and sets or clears the flag
    /// on every covered run, depending on whether the first run has it.
    pub fn format_text(&mut self, flag: TextFormat) -> EditorResult<()> {
        let range = match self.selection().cloned() {
            None => return Ok(()),
            Some(Selection::Range(range)) => range,
            Some(other) => {
                let texts: Vec<NodeKey> = other
                    .get_nodes(self.nodes())?
                    .into_iter()
                    .filter(|key| self.get(key).is_some_and(Node::is_text))
                    .collect();
                return self.apply_format(&texts, flag);
            }
        };
        if range.is_collapsed() {
            if let Some(range) = self.draft_mut()?.selection.as_mut().and_then(Selection::as_range_mut) {
                range.toggle_format(flag);
            }
            return Ok(());
        }

        let backward = range.is_backward(self.nodes())?;
        let (_, start, end) = self.range_bounds()?;
        let mut covered = Vec::new();
        for key in RangeSelection::new(start.clone(), end.clone()).get_nodes(self.nodes())? {
            let Some(text) = self.get(&key).and_then(Node::as_text) else {
                continue;
            };
            let len = text.len();
            let from = if key == start.key && start.is_text() { start.offset } else { 0 };
            let to = if key == end.key && end.is_text() { end.offset } else { len };
            if from < to {
                covered.push((key, from, to, len, text.is_simple()));
            }
        }
        if covered.is_empty() {
            return Ok(());
        }

        let mut runs = Vec::with_capacity(covered.len());
        for (key, from, to, len, simple) in covered {
            let run = if !simple {
                key
            } else if from > 0 && to < len {
                self.split_text(&key, &[from, to])?[1].clone()
            } else if from > 0 {
                self.split_text(&key, &[from])?[1].clone()
            } else if to < len {
                self.split_text(&key, &[to])?[0].clone()
            } else {
                key
            };
            runs.push(run);
        }
        self.apply_format(&runs, flag)?;

        let (Some(first), Some(last)) = (runs.first().cloned(), runs.last().cloned()) else {
            return Ok(());
        };
        let first_point = Point::text(first, 0);
        let last_point = Point::text(last.clone(), self.text(&last)?.len());
        if backward {
            self.select(last_point, first_point)
        } else {
            self.select(first_point, last_point)
        }
    }

    fn apply_format(&mut self, texts: &[NodeKey], flag: TextFormat) -> EditorResult<()> {
        let Some(first) = texts.first() else {
            return Ok(());
        };
        let enable = !self.text(first)?.has_format(flag);
        for key in texts {
            let format = self.text(key)?.format;
            if format.contains(flag) != enable {
                self.set_format(key, format.toggled(flag))?;
            }
        }
        Ok(())
    }

    /// Insert detached nodes at the selection. Inline nodes go in at the
    /// caret; block nodes split the caret's block and go in between its
    /// halves, with runs of inline nodes wrapped in paragraphs.
    pub fn insert_nodes(&mut self, keys: &[NodeKey]) -> EditorResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let collapsed = self.selection().is_some_and(Selection::is_collapsed);
        if !collapsed {
            self.remove_text()?;
        }
        let (_, caret, _) = self.range_bounds()?;

        let mut all_inline = true;
        for key in keys {
            all_inline &= self.node(key)?.is_inline();
        }

        let (parent, mut index) = if all_inline {
            self.inline_insertion_point(&caret)?
        } else if self.node(&caret.key)?.is_shadow_root() {
            (caret.key.clone(), caret.offset)
        } else {
            let split = self.split_block_at(&caret)?;
            (split.parent, split.index)
        };
        let parent_is_shadow_root = self.node(&parent)?.is_shadow_root();

        let mut wrapper: Option<NodeKey> = None;
        let mut last = keys[0].clone();
        for key in keys {
            let inline = self.node(key)?.is_inline();
            if all_inline && !parent_is_shadow_root {
                self.insert_at(&parent, index, key)?;
                index += 1;
            } else if inline {
                let paragraph = match &wrapper {
                    Some(paragraph) => paragraph.clone(),
                    None => {
                        let paragraph = self.create_paragraph()?;
                        self.insert_at(&parent, index, &paragraph)?;
                        index += 1;
                        wrapper = Some(paragraph.clone());
                        paragraph
                    }
                };
                self.append(&paragraph, key)?;
            } else {
                wrapper = None;
                self.insert_at(&parent, index, key)?;
                index += 1;
            }
            last = key.clone();
        }
        let end = point_at_end(self.nodes(), &last)?;
        self.set_caret(end)
    }

    /// Parent and index where inline content goes for a caret, splitting a
    /// text node when the caret is inside one.
    fn inline_insertion_point(&mut self, caret: &Point) -> EditorResult<(NodeKey, usize)> {
        if !caret.is_text() {
            return Ok((caret.key.clone(), caret.offset));
        }
        let parent = self
            .parent(&caret.key)
            .ok_or_else(|| ModelError::invalid_structure(format!("{} has no parent", caret.key)))?;
        let index = self
            .nodes()
            .index_in_parent(&caret.key)
            .ok_or_else(|| ModelError::not_found(&caret.key))?;
        let text = self.text(&caret.key)?;
        if caret.offset == 0 {
            Ok((parent, index))
        } else if caret.offset >= text.len() || !text.is_simple() {
            Ok((parent, index + 1))
        } else {
            self.split_text(&caret.key, &[caret.offset])?;
            Ok((parent, index + 1))
        }
    }

    /// Split the caret's block (and any inline element around the caret) in
    /// two at the caret.
    fn split_block_at(&mut self, caret: &Point) -> EditorResult<BlockSplit> {
        let block = self
            .nodes()
            .nearest_block(&caret.key)
            .ok_or_else(|| ModelError::invalid_structure(format!("{} is not inside a block", caret.key)))?;
        let (mut container, mut index) = self.inline_insertion_point(caret)?;

        while container != block {
            let len = self.element(&container)?.len();
            if index > 0 && index < len {
                let second = self.clone_element_shell(&container)?;
                for child in self.children(&container).into_iter().skip(index) {
                    self.append(&second, &child)?;
                }
                self.insert_after(&container, &second)?;
            }
            let position = self
                .nodes()
                .index_in_parent(&container)
                .ok_or_else(|| ModelError::not_found(&container))?;
            index = if index == 0 { position } else { position + 1 };
            container = self
                .parent(&container)
                .ok_or_else(|| ModelError::invalid_structure(format!("{container} has no parent")))?;
        }

        let parent = self
            .parent(&block)
            .ok_or_else(|| ModelError::invalid_structure(format!("{block} has no parent")))?;
        let position = self
            .nodes()
            .index_in_parent(&block)
            .ok_or_else(|| ModelError::not_found(&block))?;
        let len = self.element(&block)?.len();
        if index == 0 {
            return Ok(BlockSplit {
                parent,
                index: position,
                created: None,
            });
        }
        if index >= len {
            return Ok(BlockSplit {
                parent,
                index: position + 1,
                created: None,
            });
        }
        let second = self.clone_element_shell(&block)?;
        for child in self.children(&block).into_iter().skip(index) {
            self.append(&second, &child)?;
        }
        self.insert_after(&block, &second)?;
        Ok(BlockSplit {
            parent,
            index: position + 1,
            created: Some(second),
        })
    }

    /// A detached, childless copy of an element with a fresh key.
    fn clone_element_shell(&mut self, key: &NodeKey) -> EditorResult<NodeKey> {
        let mut node = self.node(key)?.clone();
        node.key = self.generate_key()?;
        node.parent = None;
        if let Some(element) = node.as_element_mut() {
            element.children.clear();
        }
        self.insert_detached(node)
    }

    /// Split the caret's block like the Enter key. In the middle of a block
    /// the second half keeps the block type. At the end, list items continue
    /// as list items and headings and quotes as paragraphs. At the start an
    /// empty block is inserted before.
    pub fn insert_paragraph(&mut self) -> EditorResult<()> {
        let collapsed = self.selection().is_some_and(Selection::is_collapsed);
        if !collapsed {
            self.remove_text()?;
        }
        let (_, caret, _) = self.range_bounds()?;
        if self.node(&caret.key)?.is_shadow_root() {
            let paragraph = self.create_paragraph()?;
            self.insert_at(&caret.key, caret.offset, &paragraph)?;
            return self.set_caret(Point::element(paragraph, 0));
        }

        let block = self
            .nodes()
            .nearest_block(&caret.key)
            .ok_or_else(|| ModelError::invalid_structure(format!("{} is not inside a block", caret.key)))?;
        let block_type = self.node(&block)?.node_type().to_string();
        let block_position = self.nodes().index_in_parent(&block);
        let split = self.split_block_at(&caret)?;

        if let Some(second) = split.created {
            let start = point_at_start(self.nodes(), &second)?;
            return self.set_caret(start);
        }
        let before = Some(split.index) == block_position && !self.element(&block)?.is_empty();
        if before {
            let fresh = self.clone_element_shell(&block)?;
            self.insert_at(&split.parent, split.index, &fresh)?;
            let start = point_at_start(self.nodes(), &block)?;
            return self.set_caret(start);
        }

        let fresh = match block_type.as_str() {
            tags::HEADING | tags::QUOTE => self.create_paragraph()?,
            _ => self.clone_element_shell(&block)?,
        };
        self.insert_at(&split.parent, split.index, &fresh)?;
        self.set_caret(Point::element(fresh, 0))
    }

    /// Insert a line break at the caret.
    pub fn insert_line_break(&mut self) -> EditorResult<()> {
        let line_break = self.create_line_break()?;
        self.insert_nodes(&[line_break])
    }

    /// The nodes covered by the selection, with boundary text nodes split so
    /// that the returned text nodes hold exactly the selected characters.
    /// The selection is moved onto the returned nodes.
    pub fn extract(&mut self) -> EditorResult<Vec<NodeKey>> {
        let range = match self.selection().cloned() {
            None => return Ok(Vec::new()),
            Some(Selection::Range(range)) => range,
            Some(other) => return Ok(other.get_nodes(self.nodes())?),
        };
        if range.is_collapsed() {
            return Ok(range.get_nodes(self.nodes())?);
        }
        let backward = range.is_backward(self.nodes())?;
        let (_, mut start, mut end) = self.range_bounds()?;

        if end.is_text() {
            let text = self.text(&end.key)?;
            if text.is_simple() && end.offset > 0 && end.offset < text.len() {
                self.split_text(&end.key, &[end.offset])?;
            }
        }
        if start.is_text() {
            let text = self.text(&start.key)?;
            let limit = if start.key == end.key { end.offset } else { text.len() };
            if text.is_simple() && start.offset > 0 && start.offset < limit {
                let parts = self.split_text(&start.key, &[start.offset])?;
                if start.key == end.key {
                    end = Point::text(parts[1].clone(), end.offset - start.offset);
                }
                start = Point::text(parts[1].clone(), 0);
            }
        }

        let mut nodes = RangeSelection::new(start.clone(), end.clone()).get_nodes(self.nodes())?;
        if nodes.len() > 1 && start.is_text() && start.offset > 0 && start.offset >= self.text(&start.key)?.len() {
            nodes.remove(0);
        }
        if nodes.len() > 1 && end.is_text() && end.offset == 0 {
            nodes.pop();
        }

        let first = nodes.first().filter(|key| self.get(key).is_some_and(Node::is_text)).cloned();
        let last = nodes.last().filter(|key| self.get(key).is_some_and(Node::is_text)).cloned();
        if let (Some(first), Some(last)) = (first, last) {
            let first_point = Point::text(first, 0);
            let last_point = Point::text(last.clone(), self.text(&last)?.len());
            if backward {
                self.select(last_point, first_point)?;
            } else {
                self.select(first_point, last_point)?;
            }
        }
        Ok(nodes)
    }
}

/// Character offset reached by moving one `unit` from `offset`.
fn step(text: &str, offset: usize, backward: bool, unit: Unit) -> usize {
    match unit {
        Unit::Character => {
            let mut bounds = vec![0];
            let mut total = 0;
            for grapheme in text.graphemes(true) {
                total += grapheme.chars().count();
                bounds.push(total);
            }
            if backward {
                bounds.into_iter().rev().find(|b| *b < offset).unwrap_or(0)
            } else {
                bounds.into_iter().find(|b| *b > offset).unwrap_or(total)
            }
        }
        Unit::Word => {
            let mut segments = Vec::new();
            let mut total = 0;
            for segment in text.split_word_bounds() {
                let len = segment.chars().count();
                segments.push((total, total + len, segment.trim().is_empty()));
                total += len;
            }
            if backward {
                segments
                    .iter()
                    .rev()
                    .filter(|(start, _, _)| *start < offset)
                    .find(|(_, _, blank)| !blank)
                    .map(|(start, _, _)| *start)
                    .unwrap_or(0)
            } else {
                segments
                    .iter()
                    .filter(|(_, end, _)| *end > offset)
                    .find(|(_, _, blank)| !blank)
                    .map(|(_, end, _)| *end)
                    .unwrap_or(total)
            }
        }
        Unit::Line => {
            if backward {
                0
            } else {
                text.chars().count()
            }
        }
    }
}
