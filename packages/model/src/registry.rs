//! Node type registry
//!
//! Node behaviour is looked up by type tag in a table of descriptors instead
//! of being attached to the node values, so third-party types plug in by
//! registering a descriptor.

use crate::element::{DecoratorNode, ElementCapabilities, ElementFormat, ElementNode, Props};
use crate::node::tags;
use crate::serialize::SerializedNode;
use crate::text::{TextDetail, TextFormat, TextMode, TextNode};
use crate::{ModelError, ModelResult, Node, NodeKey, NodeKind};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Opaque value a decorator hands to the rendering collaborator.
pub type DecoratorPayload = Arc<dyn Any + Send + Sync>;

pub type ImportJsonFn = fn(&NodeTypeDescriptor, &SerializedNode) -> ModelResult<NodeKind>;
pub type DecorateFn = fn(&Node) -> DecoratorPayload;

/// Capabilities of the root element.
pub const ROOT_CAPS: ElementCapabilities =
    ElementCapabilities::CAN_BE_EMPTY.union(ElementCapabilities::SHADOW_ROOT);

/// Field names handled by the element payload itself rather than props.
const ELEMENT_FIELDS: [&str; 3] = ["direction", "format", "indent"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Element,
    Text,
    LineBreak,
    Decorator,
}

/// An HTML tag a node type can be imported from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomConversion {
    pub tag_name: &'static str,
    pub priority: u8,
}

#[derive(Clone)]
pub struct NodeTypeDescriptor {
    pub tag: Arc<str>,
    pub class: NodeClass,
    pub caps: ElementCapabilities,
    /// Decorators only.
    pub inline: bool,
    pub version: u32,
    /// Initial props of freshly constructed nodes.
    pub defaults: Props,
    pub import_json: ImportJsonFn,
    pub dom_conversions: Vec<DomConversion>,
    pub decorate: Option<DecorateFn>,
}

impl fmt::Debug for NodeTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeDescriptor")
            .field("tag", &self.tag)
            .field("class", &self.class)
            .field("caps", &self.caps)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl NodeTypeDescriptor {
    fn with_class(tag: &str, class: NodeClass, import_json: ImportJsonFn) -> Self {
        Self {
            tag: Arc::from(tag),
            class,
            caps: ElementCapabilities::empty(),
            inline: false,
            version: 1,
            defaults: Props::new(),
            import_json,
            dom_conversions: Vec::new(),
            decorate: None,
        }
    }

    pub fn element(tag: &str, caps: ElementCapabilities) -> Self {
        let mut descriptor = Self::with_class(tag, NodeClass::Element, import_element);
        descriptor.caps = caps;
        descriptor
    }

    pub fn text() -> Self {
        Self::with_class(tags::TEXT, NodeClass::Text, import_text)
    }

    pub fn line_break() -> Self {
        Self::with_class(tags::LINE_BREAK, NodeClass::LineBreak, import_line_break)
    }

    pub fn decorator(tag: &str, inline: bool, decorate: DecorateFn) -> Self {
        let mut descriptor = Self::with_class(tag, NodeClass::Decorator, import_decorator);
        descriptor.inline = inline;
        descriptor.decorate = Some(decorate);
        descriptor
    }

    pub fn with_default(mut self, name: &str, value: Value) -> Self {
        self.defaults.insert(name.to_string(), value);
        self
    }

    pub fn with_dom(mut self, tag_names: &[&'static str]) -> Self {
        self.dom_conversions
            .extend(tag_names.iter().map(|tag_name| DomConversion { tag_name, priority: 0 }));
        self
    }

    pub fn with_import(mut self, import_json: ImportJsonFn) -> Self {
        self.import_json = import_json;
        self
    }

    /// Construct a node of this type with default fields.
    pub fn create(&self, key: NodeKey) -> Node {
        let kind = match self.class {
            NodeClass::Element => {
                let mut element = ElementNode::new(self.caps);
                element.props = self.defaults.clone();
                NodeKind::Element(element)
            }
            NodeClass::Text => NodeKind::Text(TextNode::default()),
            NodeClass::LineBreak => NodeKind::LineBreak,
            NodeClass::Decorator => NodeKind::Decorator(DecoratorNode {
                inline: self.inline,
                props: self.defaults.clone(),
            }),
        };
        Node::new(key, &self.tag, kind)
    }
}

fn import_element(descriptor: &NodeTypeDescriptor, serialized: &SerializedNode) -> ModelResult<NodeKind> {
    let mut element = ElementNode::new(descriptor.caps);
    let fields = &serialized.fields;
    if let Some(format) = fields.get("format") {
        element.format = serde_json::from_value::<ElementFormat>(format.clone())?;
    }
    if let Some(indent) = fields.get("indent").and_then(Value::as_u64) {
        element.indent = u32::try_from(indent).unwrap_or(u32::MAX);
    }
    if let Some(direction) = fields.get("direction") {
        element.direction = serde_json::from_value(direction.clone())?;
    }
    element.props = descriptor.defaults.clone();
    for (name, value) in fields {
        if !ELEMENT_FIELDS.contains(&name.as_str()) {
            element.props.insert(name.clone(), value.clone());
        }
    }
    Ok(NodeKind::Element(element))
}

fn import_text(_descriptor: &NodeTypeDescriptor, serialized: &SerializedNode) -> ModelResult<NodeKind> {
    let fields = &serialized.fields;
    let bits = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };
    let mut text = TextNode::new(fields.get("text").and_then(Value::as_str).unwrap_or_default());
    text.format = TextFormat::from_bits_truncate(bits("format"));
    text.detail = TextDetail::from_bits_truncate(bits("detail"));
    if let Some(mode) = fields.get("mode") {
        text.mode = serde_json::from_value::<TextMode>(mode.clone())?;
    }
    text.style = fields
        .get("style")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(NodeKind::Text(text))
}

fn import_line_break(_descriptor: &NodeTypeDescriptor, _serialized: &SerializedNode) -> ModelResult<NodeKind> {
    Ok(NodeKind::LineBreak)
}

fn import_decorator(descriptor: &NodeTypeDescriptor, serialized: &SerializedNode) -> ModelResult<NodeKind> {
    let mut props = descriptor.defaults.clone();
    props.extend(serialized.fields.clone());
    Ok(NodeKind::Decorator(DecoratorNode {
        inline: descriptor.inline,
        props,
    }))
}

fn import_heading(descriptor: &NodeTypeDescriptor, serialized: &SerializedNode) -> ModelResult<NodeKind> {
    let kind = import_element(descriptor, serialized)?;
    let tag = kind
        .as_element()
        .and_then(|element| element.props.get("tag"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
        return Err(ModelError::invalid_structure(format!("invalid heading tag {tag:?}")));
    }
    Ok(kind)
}

/// Registered node types, in registration order.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    types: Vec<Arc<NodeTypeDescriptor>>,
    by_tag: HashMap<Arc<str>, usize>,
}

impl NodeRegistry {
    /// An empty registry. Most callers want [`NodeRegistry::with_builtins`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_types() {
            registry.insert(descriptor);
        }
        registry
    }

    pub fn register(&mut self, descriptor: NodeTypeDescriptor) -> ModelResult<()> {
        if self.by_tag.contains_key(&descriptor.tag) {
            return Err(ModelError::invalid_structure(format!(
                "node type {} is already registered",
                descriptor.tag
            )));
        }
        tracing::debug!(node_type = %descriptor.tag, "registered node type");
        self.insert(descriptor);
        Ok(())
    }

    /// `descriptor.tag` must not be registered yet.
    fn insert(&mut self, descriptor: NodeTypeDescriptor) {
        self.by_tag.insert(descriptor.tag.clone(), self.types.len());
        self.types.push(Arc::new(descriptor));
    }

    pub fn get(&self, tag: &str) -> Option<&NodeTypeDescriptor> {
        self.by_tag.get(tag).map(|&i| self.types[i].as_ref())
    }

    /// Fails with `UnknownNodeType` for unregistered tags.
    pub fn require(&self, tag: &str) -> ModelResult<&NodeTypeDescriptor> {
        self.get(tag)
            .ok_or_else(|| ModelError::UnknownNodeType(tag.to_string()))
    }

    /// Registration index, used to order per-type work.
    pub fn position(&self, tag: &str) -> Option<usize> {
        self.by_tag.get(tag).copied()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub fn create(&self, tag: &str, key: NodeKey) -> ModelResult<Node> {
        Ok(self.require(tag)?.create(key))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|descriptor| descriptor.tag.as_ref())
    }

    /// The node type an HTML element of `tag_name` imports as.
    pub fn conversion_for(&self, tag_name: &str) -> Option<&NodeTypeDescriptor> {
        self.types
            .iter()
            .filter_map(|descriptor| {
                descriptor
                    .dom_conversions
                    .iter()
                    .find(|conversion| conversion.tag_name.eq_ignore_ascii_case(tag_name))
                    .map(|conversion| (conversion.priority, descriptor.as_ref()))
            })
            .max_by_key(|(priority, _)| *priority)
            .map(|(_, descriptor)| descriptor)
    }
}

fn builtin_types() -> Vec<NodeTypeDescriptor> {
    use ElementCapabilities as Caps;
    let cell_caps = Caps::CAN_BE_EMPTY
        .union(Caps::TEXT_BEFORE)
        .union(Caps::TEXT_AFTER)
        .union(Caps::SHADOW_ROOT);
    vec![
        NodeTypeDescriptor::element(tags::ROOT, ROOT_CAPS),
        NodeTypeDescriptor::element(tags::PARAGRAPH, Caps::BLOCK).with_dom(&["p"]),
        NodeTypeDescriptor::text().with_dom(&["span", "#text"]),
        NodeTypeDescriptor::line_break().with_dom(&["br"]),
        NodeTypeDescriptor::element(tags::HEADING, Caps::BLOCK)
            .with_default("tag", json!("h1"))
            .with_import(import_heading)
            .with_dom(&["h1", "h2", "h3", "h4", "h5", "h6"]),
        NodeTypeDescriptor::element(tags::QUOTE, Caps::BLOCK).with_dom(&["blockquote"]),
        NodeTypeDescriptor::element(tags::LIST, Caps::TEXT_BEFORE.union(Caps::TEXT_AFTER))
            .with_default("listType", json!("bullet"))
            .with_default("start", json!(1))
            .with_dom(&["ul", "ol"]),
        NodeTypeDescriptor::element(tags::LIST_ITEM, Caps::BLOCK)
            .with_default("value", json!(1))
            .with_dom(&["li"]),
        NodeTypeDescriptor::element(tags::LINK, Caps::INLINE)
            .with_default("url", json!(""))
            .with_dom(&["a"]),
        NodeTypeDescriptor::element(tags::TABLE, Caps::empty()).with_dom(&["table"]),
        NodeTypeDescriptor::element(tags::TABLE_ROW, Caps::empty()).with_dom(&["tr"]),
        NodeTypeDescriptor::element(tags::TABLE_CELL, cell_caps)
            .with_default("headerState", json!(0))
            .with_default("colSpan", json!(1))
            .with_default("rowSpan", json!(1))
            .with_dom(&["td", "th"]),
    ]
}
