use crate::NodeKey;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid offset {offset} (size {size})")]
    InvalidOffset { offset: usize, size: usize },

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),

    #[error("Selection could not be resolved against the document")]
    SelectionLost,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure(message.into())
    }

    pub fn invalid_offset(offset: usize, size: usize) -> Self {
        Self::InvalidOffset { offset, size }
    }

    pub fn not_found(key: &NodeKey) -> Self {
        Self::NodeNotFound(key.clone())
    }
}
