//! # Undo/Redo History
//!
//! Records committed states and swaps them back in on undo/redo.
//!
//! ## Design
//!
//! - An update listener pushes the state each commit replaced
//! - Commits tagged `historic` (undo/redo itself) or `without-history` are
//!   not recorded, nor are commits that only moved the selection
//! - Undo installs the most recent recorded state and moves the current one
//!   to the redo stack; redo does the reverse
//! - A new entry clears the redo stack
//! - Commits between `begin_batch` and `end_batch` form one undo step
//!
//! Recorded states share their nodes with the live document, so an entry
//! costs one map of pointers, not a copy of the tree.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut editor = Editor::new(EditorConfig::default());
//! let history = History::register(&mut editor);
//!
//! editor.update(|txn| txn.insert_text("hi"), UpdateOptions::discrete())?;
//! history.undo(&mut editor)?;
//! history.redo(&mut editor)?;
//! ```

use crate::{Editor, EditorResult, ListenerId, UpdatePayload, TAG_HISTORIC, TAG_WITHOUT_HISTORY};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tessera_model::EditorState;
use tracing::debug;

#[derive(Debug, Default)]
struct HistoryStack {
    /// Recorded states (most recent last)
    undo_stack: Vec<Arc<EditorState>>,

    /// Undone states (most recent last)
    redo_stack: Vec<Arc<EditorState>>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Set while batching; holds the state from before the batch once the
    /// first commit in it arrives
    batch: Option<Option<Arc<EditorState>>>,
}

impl HistoryStack {
    fn record(&mut self, payload: &UpdatePayload) {
        if payload.has_tag(TAG_HISTORIC) || payload.has_tag(TAG_WITHOUT_HISTORY) {
            return;
        }
        if payload.dirty.is_empty() {
            return;
        }
        match &mut self.batch {
            Some(start) => {
                if start.is_none() {
                    *start = Some(Arc::clone(&payload.prev_state));
                }
            }
            None => self.push(Arc::clone(&payload.prev_state)),
        }
    }

    fn push(&mut self, state: Arc<EditorState>) {
        self.undo_stack.push(state);

        // Trim if exceeded max levels
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // A new edit invalidates the undone future
        self.redo_stack.clear();
    }
}

/// Undo/redo for one editor. Cloning shares the same stacks.
#[derive(Debug, Clone)]
pub struct History {
    stack: Rc<RefCell<HistoryStack>>,
    listener: ListenerId,
}

impl History {
    /// Start recording `editor`'s commits, keeping up to the configured
    /// `history_max_levels` undo steps.
    pub fn register(editor: &mut Editor) -> Self {
        let stack = Rc::new(RefCell::new(HistoryStack {
            max_levels: editor.config().history_max_levels,
            ..Default::default()
        }));
        let recorder = Rc::clone(&stack);
        let listener = editor.register_update_listener(move |payload| {
            recorder.borrow_mut().record(payload);
        });
        Self { stack, listener }
    }

    /// Stop recording. The stacks stay usable.
    pub fn unregister(&self, editor: &mut Editor) -> bool {
        editor.remove_listener(self.listener)
    }

    /// Undo the most recent step. Returns `false` when there is none.
    pub fn undo(&self, editor: &mut Editor) -> EditorResult<bool> {
        editor.flush()?;
        let target = {
            let mut stack = self.stack.borrow_mut();
            let Some(target) = stack.undo_stack.pop() else {
                return Ok(false);
            };
            stack.redo_stack.push(editor.state());
            target
        };
        debug!(levels = self.undo_levels(), "undo");
        editor.set_editor_state_with_tag(target, TAG_HISTORIC)?;
        Ok(true)
    }

    /// Redo the most recently undone step. Returns `false` when there is none.
    pub fn redo(&self, editor: &mut Editor) -> EditorResult<bool> {
        editor.flush()?;
        let target = {
            let mut stack = self.stack.borrow_mut();
            let Some(target) = stack.redo_stack.pop() else {
                return Ok(false);
            };
            stack.undo_stack.push(editor.state());
            target
        };
        debug!(levels = self.redo_levels(), "redo");
        editor.set_editor_state_with_tag(target, TAG_HISTORIC)?;
        Ok(true)
    }

    /// Group the following commits into one undo step.
    pub fn begin_batch(&self) {
        self.stack.borrow_mut().batch = Some(None);
    }

    /// Close the current batch and record it if anything was committed.
    pub fn end_batch(&self) {
        let mut stack = self.stack.borrow_mut();
        if let Some(Some(start)) = stack.batch.take() {
            stack.push(start);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.stack.borrow().undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.stack.borrow().redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.stack.borrow().undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.stack.borrow().redo_stack.len()
    }

    /// Clear all undo/redo history
    pub fn clear(&self) {
        let mut stack = self.stack.borrow_mut();
        stack.undo_stack.clear();
        stack.redo_stack.clear();
        stack.batch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EditorConfig, Txn, UpdateOptions};
    use tessera_model::NodeKey;

    fn add_paragraph(editor: &mut Editor, text: &'static str) {
        editor
            .update(
                move |txn: &mut Txn<'_>| {
                    let paragraph = txn.create_paragraph()?;
                    let content = txn.create_text(text)?;
                    txn.append(&paragraph, &content)?;
                    txn.append(&NodeKey::root(), &paragraph)
                },
                UpdateOptions::discrete(),
            )
            .unwrap();
    }

    #[test]
    fn test_history_creation() {
        let mut editor = Editor::new(EditorConfig::default());
        let history = History::register(&mut editor);
        assert_eq!(history.undo_levels(), 0);
        assert_eq!(history.redo_levels(), 0);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(!history.undo(&mut editor).unwrap());
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut editor = Editor::new(EditorConfig::default());
        let history = History::register(&mut editor);
        add_paragraph(&mut editor, "one");
        add_paragraph(&mut editor, "two");
        assert_eq!(history.undo_levels(), 2);

        assert!(history.undo(&mut editor).unwrap());
        assert_eq!(editor.state().text_content(), "one");
        assert!(history.can_redo());

        assert!(history.redo(&mut editor).unwrap());
        assert_eq!(editor.state().text_content(), "one\n\ntwo");
        assert_eq!(history.undo_levels(), 2);
        assert_eq!(history.redo_levels(), 0);
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut editor = Editor::new(EditorConfig::default());
        let history = History::register(&mut editor);
        add_paragraph(&mut editor, "one");
        history.undo(&mut editor).unwrap();
        assert!(history.can_redo());
        add_paragraph(&mut editor, "two");
        assert!(!history.can_redo());
    }

    #[test]
    fn test_batch_is_one_step() {
        let mut editor = Editor::new(EditorConfig::default());
        let history = History::register(&mut editor);
        history.begin_batch();
        add_paragraph(&mut editor, "one");
        add_paragraph(&mut editor, "two");
        history.end_batch();
        assert_eq!(history.undo_levels(), 1);

        history.undo(&mut editor).unwrap();
        assert!(editor.state().is_empty());
    }

    #[test]
    fn test_max_levels_trims_oldest() {
        let config = EditorConfig {
            history_max_levels: 2,
            ..Default::default()
        };
        let mut editor = Editor::new(config);
        let history = History::register(&mut editor);
        for text in ["a", "b", "c"] {
            add_paragraph(&mut editor, text);
        }
        assert_eq!(history.undo_levels(), 2);
    }

    #[test]
    fn test_without_history_tag_is_skipped() {
        let mut editor = Editor::new(EditorConfig::default());
        let history = History::register(&mut editor);
        editor
            .update(
                |txn: &mut Txn<'_>| {
                    let paragraph = txn.create_paragraph()?;
                    txn.append(&NodeKey::root(), &paragraph)
                },
                UpdateOptions::discrete().with_tag(TAG_WITHOUT_HISTORY),
            )
            .unwrap();
        assert!(!history.can_undo());
    }
}
