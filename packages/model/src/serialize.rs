//! JSON serialization
//!
//! Nodes serialize as `{type, version, ...fields, children?}`. Keys are never
//! written out: importing always generates fresh ones.

use crate::element::{Direction, ElementFormat};
use crate::node::tags;
use crate::registry::{NodeClass, NodeRegistry};
use crate::{KeyGenerator, ModelError, ModelResult, Node, NodeKey, NodeKind, NodeMap};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const NODE_VERSION: u32 = 1;

/// Version string stamped on exported documents.
pub const DOCUMENT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn default_version() -> u32 {
    NODE_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<SerializedNode>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SerializedNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            version: NODE_VERSION,
            children: None,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn with_children(mut self, children: Vec<SerializedNode>) -> Self {
        self.children = Some(children);
        self
    }
}

/// A persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedDocument {
    pub root: SerializedNode,
    /// Milliseconds since the Unix epoch.
    pub last_saved: i64,
    pub source: String,
    pub version: String,
}

impl SerializedDocument {
    pub fn new(root: SerializedNode, source: impl Into<String>) -> Self {
        Self {
            root,
            last_saved: chrono::Utc::now().timestamp_millis(),
            source: source.into(),
            version: DOCUMENT_VERSION.to_string(),
        }
    }
}

/// Serialize the subtree rooted at `key`.
pub fn export_node(nodes: &NodeMap, key: &NodeKey) -> ModelResult<SerializedNode> {
    let node = nodes.node(key)?;
    let mut serialized = SerializedNode::new(node.node_type());
    match &node.kind {
        NodeKind::Element(element) => {
            let direction = match element.direction {
                Some(Direction::Ltr) => json!("ltr"),
                Some(Direction::Rtl) => json!("rtl"),
                None => Value::Null,
            };
            let format = element.format.as_css().unwrap_or_default();
            serialized = serialized
                .with_field("direction", direction)
                .with_field("format", json!(format))
                .with_field("indent", json!(element.indent));
            serialized.fields.extend(element.props.clone());
            let children = element
                .children
                .iter()
                .map(|child| export_node(nodes, child))
                .collect::<ModelResult<Vec<_>>>()?;
            serialized.children = Some(children);
        }
        NodeKind::Text(text) => {
            serialized = serialized
                .with_field("text", json!(text.text))
                .with_field("format", json!(text.format.bits()))
                .with_field("mode", serde_json::to_value(text.mode)?)
                .with_field("detail", json!(text.detail.bits()))
                .with_field("style", json!(text.style));
        }
        NodeKind::LineBreak => {}
        NodeKind::Decorator(decorator) => {
            serialized.fields.extend(decorator.props.clone());
        }
    }
    Ok(serialized)
}

/// Import a serialized subtree into `out`, generating fresh keys. Returns the
/// key of the subtree's top node, whose parent is left unset.
///
/// Nothing is written to `out` unless the whole subtree imports.
pub fn import_node(
    registry: &NodeRegistry,
    keys: &mut KeyGenerator,
    serialized: &SerializedNode,
    out: &mut NodeMap,
) -> ModelResult<NodeKey> {
    let mut staged = Vec::new();
    let key = import_into(registry, keys, serialized, None, &mut staged)?;
    for node in staged {
        out.insert(node);
    }
    Ok(key)
}

fn import_into(
    registry: &NodeRegistry,
    keys: &mut KeyGenerator,
    serialized: &SerializedNode,
    parent: Option<NodeKey>,
    staged: &mut Vec<Node>,
) -> ModelResult<NodeKey> {
    let descriptor = registry.require(&serialized.node_type)?;
    let kind = (descriptor.import_json)(descriptor, serialized)?;
    let key = if serialized.node_type == tags::ROOT {
        NodeKey::root()
    } else {
        keys.generate()
    };

    let children = serialized.children.as_deref().unwrap_or_default();
    if descriptor.class != NodeClass::Element && !children.is_empty() {
        return Err(ModelError::invalid_structure(format!(
            "{} nodes cannot have children",
            serialized.node_type
        )));
    }

    let mut node = Node::new(key.clone(), &descriptor.tag, kind);
    node.parent = parent;
    let mut child_keys = Vec::with_capacity(children.len());
    for child in children {
        if child.node_type == tags::ROOT {
            return Err(ModelError::invalid_structure("root cannot be a child"));
        }
        child_keys.push(import_into(registry, keys, child, Some(key.clone()), staged)?);
    }
    if let Some(element) = node.as_element_mut() {
        element.children = child_keys;
    }
    staged.push(node);
    Ok(key)
}

/// Build a node map from a persisted document.
pub fn import_document(
    registry: &NodeRegistry,
    keys: &mut KeyGenerator,
    document: &SerializedDocument,
) -> ModelResult<NodeMap> {
    if document.root.node_type != tags::ROOT {
        return Err(ModelError::invalid_structure(format!(
            "document root has type {}",
            document.root.node_type
        )));
    }
    let mut nodes = NodeMap::new();
    import_node(registry, keys, &document.root, &mut nodes)?;
    nodes.validate()?;
    Ok(nodes)
}

/// Parse an element alignment from its serialized name.
pub fn parse_element_format(name: &str) -> ModelResult<ElementFormat> {
    Ok(serde_json::from_value(json!(name))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TextFormat;

    fn document_json() -> &'static str {
        r#"{
            "root": {
                "type": "root", "version": 1, "direction": null, "format": "", "indent": 0,
                "children": [
                    {
                        "type": "paragraph", "version": 1, "direction": "ltr", "format": "center", "indent": 1,
                        "children": [
                            {"type": "text", "version": 1, "text": "Hi ", "format": 1, "mode": "normal", "detail": 0, "style": ""},
                            {"type": "link", "version": 1, "url": "https://example.com", "direction": null, "format": "", "indent": 0,
                             "children": [{"type": "text", "version": 1, "text": "there", "format": 0, "mode": "token", "detail": 0, "style": "color: red"}]},
                            {"type": "linebreak", "version": 1}
                        ]
                    }
                ]
            },
            "lastSaved": 1700000000000,
            "source": "tests",
            "version": "0.1.0"
        }"#
    }

    #[test]
    fn test_import_generates_fresh_keys() -> anyhow::Result<()> {
        let registry = NodeRegistry::with_builtins();
        let mut keys = KeyGenerator::new();
        let document: SerializedDocument = serde_json::from_str(document_json())?;
        let nodes = import_document(&registry, &mut keys, &document)?;

        assert_eq!(nodes.len(), 6);
        let paragraph = nodes.children(&NodeKey::root())[0].clone();
        let element = nodes.node(&paragraph)?.as_element().unwrap();
        assert_eq!(element.format, ElementFormat::Center);
        assert_eq!(element.direction, Some(Direction::Ltr));
        assert_eq!(element.indent, 1);

        let first = nodes.node(&element.children[0])?.as_text().unwrap();
        assert_eq!(first.format, TextFormat::BOLD);
        assert_eq!(nodes.text_content(&NodeKey::root()), "Hi there\n");
        Ok(())
    }

    #[test]
    fn test_export_round_trip_preserves_fields() -> anyhow::Result<()> {
        let registry = NodeRegistry::with_builtins();
        let mut keys = KeyGenerator::new();
        let document: SerializedDocument = serde_json::from_str(document_json())?;
        let nodes = import_document(&registry, &mut keys, &document)?;

        let exported = export_node(&nodes, &NodeKey::root())?;
        assert_eq!(exported, document.root);

        let reimported = import_document(
            &registry,
            &mut keys,
            &SerializedDocument::new(exported, "tests"),
        )?;
        let paragraph = &reimported.children(&NodeKey::root())[0];
        assert!(!nodes.contains(paragraph));
        Ok(())
    }

    #[test]
    fn test_unknown_type_fails_whole_import() {
        let registry = NodeRegistry::with_builtins();
        let mut keys = KeyGenerator::new();
        let root = SerializedNode::new("root").with_children(vec![
            SerializedNode::new("paragraph").with_children(vec![]),
            SerializedNode::new("video"),
        ]);
        let mut out = NodeMap::new();
        let result = import_node(&registry, &mut keys, &root, &mut out);
        assert!(matches!(result, Err(ModelError::UnknownNodeType(t)) if t == "video"));
        assert!(out.is_empty());
    }

    #[test]
    fn test_text_cannot_have_children() {
        let registry = NodeRegistry::with_builtins();
        let mut keys = KeyGenerator::new();
        let text = SerializedNode::new("text")
            .with_field("text", json!("a"))
            .with_children(vec![SerializedNode::new("linebreak")]);
        let mut out = NodeMap::new();
        assert!(matches!(
            import_node(&registry, &mut keys, &text, &mut out),
            Err(ModelError::InvalidStructure(_))
        ));
    }
}
