//! Error types for the editor

use tessera_html::ExportError;
use tessera_model::ModelError;
use tessera_reconciler::ReconcileError;
use thiserror::Error;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Document is read-only outside an update")]
    ReadOnlyViolation,

    #[error("Node transforms did not settle after {iterations} rounds")]
    InfiniteTransformLoop { iterations: usize },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command {0} received a payload of the wrong type")]
    CommandPayload(&'static str),
}

impl EditorError {
    pub fn is_read_only_violation(&self) -> bool {
        matches!(self, EditorError::ReadOnlyViolation)
    }

    pub fn is_infinite_transform_loop(&self) -> bool {
        matches!(self, EditorError::InfiniteTransformLoop { .. })
    }

    pub fn is_invalid_structure(&self) -> bool {
        matches!(self, EditorError::Model(ModelError::InvalidStructure(_)))
    }

    pub fn is_invalid_offset(&self) -> bool {
        matches!(self, EditorError::Model(ModelError::InvalidOffset { .. }))
    }

    pub fn is_unknown_node_type(&self) -> bool {
        matches!(self, EditorError::Model(ModelError::UnknownNodeType(_)))
    }

    pub fn is_selection_lost(&self) -> bool {
        matches!(self, EditorError::Model(ModelError::SelectionLost))
    }
}
