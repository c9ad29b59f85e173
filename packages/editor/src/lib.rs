//! # Tessera Editor
//!
//! Transactional editing engine for Tessera documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: nodes, selection, versioned states   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: update transactions                 │
//! │  - Copy-on-write drafts of committed state  │
//! │  - Structural and selection edits           │
//! │  - Node transforms, text normalization      │
//! │  - Commands, listeners, history             │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ reconciler: state diff → presentation host  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Committed states are immutable**: every update works on a draft and
//!    swaps it in at commit
//! 2. **Explicit transactions**: mutators receive a [`Txn`]; there is no
//!    ambient active editor
//! 3. **Keys, not references**: tree edges are node keys resolved against
//!    one state
//! 4. **Minimal presentation work**: only dirty nodes are reconciled
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tessera_editor::{Editor, EditorConfig, Txn, UpdateOptions};
//! use tessera_model::NodeKey;
//!
//! let mut editor = Editor::new(EditorConfig::default());
//!
//! editor.update(
//!     |txn: &mut Txn<'_>| {
//!         let paragraph = txn.create_paragraph()?;
//!         let text = txn.create_text("Hello")?;
//!         txn.append(&paragraph, &text)?;
//!         txn.append(&NodeKey::root(), &paragraph)?;
//!         txn.select_end(&text)
//!     },
//!     UpdateOptions::discrete(),
//! )?;
//!
//! editor.dispatch_command(tessera_editor::INSERT_TEXT, " world".to_string())?;
//! assert_eq!(editor.state().text_content(), "Hello world");
//! ```

pub mod clipboard;
pub mod commands;
pub mod config;
pub mod editor;
pub mod errors;
pub mod history;
mod mutations;
mod normalize;
mod selection_ops;
pub mod transaction;
pub mod transforms;

pub use clipboard::{clone_selected_content, convert_selection_to_html, ClonedContent};
pub use commands::{
    Command, CommandHandler, CommandPriority, DELETE_CHARACTER, DELETE_LINE, DELETE_WORD, FORMAT_TEXT,
    INSERT_LINE_BREAK, INSERT_PARAGRAPH, INSERT_TEXT, REMOVE_TEXT,
};
pub use config::{EditorConfig, DEFAULT_CONFIG_NAME};
pub use editor::{Editor, ListenerId, MutationListener, MutationRecord, UpdateListener, UpdatePayload};
pub use errors::{EditorError, EditorResult};
pub use history::History;
pub use transaction::{Mutator, Txn, UpdateOptions, TAG_HISTORIC, TAG_WITHOUT_HISTORY};
pub use transforms::{TransformEngine, TransformFn};
