//! Versioned document state
//!
//! An [`EditorState`] is a node map plus an optional selection. Committed
//! states are shared as `Arc<EditorState>` and never written to again; a
//! transaction works on a clone, which shares every node allocation until the
//! node is first written.

use crate::element::ElementNode;
use crate::node::tags;
use crate::registry::{NodeRegistry, ROOT_CAPS};
use crate::selection::Selection;
use crate::serialize::{export_node, import_document, SerializedDocument};
use crate::{KeyGenerator, ModelResult, Node, NodeKey, NodeKind, NodeMap};

#[derive(Debug, Clone)]
pub struct EditorState {
    pub nodes: NodeMap,
    pub selection: Option<Selection>,
}

impl Default for EditorState {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorState {
    /// A document holding only an empty root.
    pub fn new() -> Self {
        let mut nodes = NodeMap::new();
        nodes.insert(Node::new(
            NodeKey::root(),
            tags::ROOT,
            NodeKind::Element(ElementNode::new(ROOT_CAPS)),
        ));
        Self {
            nodes,
            selection: None,
        }
    }

    pub fn from_nodes(nodes: NodeMap) -> Self {
        Self {
            nodes,
            selection: None,
        }
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node(&self, key: &NodeKey) -> ModelResult<&Node> {
        self.nodes.node(key)
    }

    /// True when the root has no children.
    pub fn is_empty(&self) -> bool {
        self.nodes.children(&NodeKey::root()).is_empty()
    }

    pub fn text_content(&self) -> String {
        self.nodes.text_content(&NodeKey::root())
    }

    pub fn to_document(&self, source: &str) -> ModelResult<SerializedDocument> {
        let root = export_node(&self.nodes, &NodeKey::root())?;
        tracing::debug!(nodes = self.nodes.len(), source, "exported document");
        Ok(SerializedDocument::new(root, source))
    }

    pub fn to_json(&self, source: &str) -> ModelResult<String> {
        Ok(serde_json::to_string(&self.to_document(source)?)?)
    }

    pub fn from_document(
        registry: &NodeRegistry,
        keys: &mut KeyGenerator,
        document: &SerializedDocument,
    ) -> ModelResult<Self> {
        let nodes = import_document(registry, keys, document)?;
        tracing::debug!(
            nodes = nodes.len(),
            source = %document.source,
            version = %document.version,
            "imported document"
        );
        Ok(Self::from_nodes(nodes))
    }

    pub fn from_json(registry: &NodeRegistry, keys: &mut KeyGenerator, json: &str) -> ModelResult<Self> {
        let document: SerializedDocument = serde_json::from_str(json)?;
        Self::from_document(registry, keys, &document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_has_only_root() {
        let state = EditorState::new();
        assert_eq!(state.nodes.len(), 1);
        assert!(state.is_empty());
        assert!(state.nodes.validate().is_ok());
        assert!(state.node(&NodeKey::root()).unwrap().is_shadow_root());
    }

    #[test]
    fn test_json_round_trip() -> anyhow::Result<()> {
        let registry = NodeRegistry::with_builtins();
        let mut keys = KeyGenerator::new();
        let json = EditorState::new().to_json("tests")?;
        let state = EditorState::from_json(&registry, &mut keys, &json)?;
        assert!(state.is_empty());
        assert!(json.contains("\"lastSaved\""));
        Ok(())
    }
}
