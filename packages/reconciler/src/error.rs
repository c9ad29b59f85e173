use tessera_model::NodeKey;
use thiserror::Error;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Failure reported by a presentation host hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Presentation host failed: {0}")]
    Host(#[from] HostError),

    #[error("Node {0} is missing from the committed state")]
    MissingNode(NodeKey),

    #[error("Node {0} has no presentation handle")]
    MissingHandle(NodeKey),
}
