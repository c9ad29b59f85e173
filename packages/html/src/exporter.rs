use serde_json::Value;
use tessera_model::{tags, Direction, ElementNode, Node, NodeKey, NodeKind, NodeMap, TextFormat, TextNode};
use thiserror::Error;

pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur during HTML export
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Node not found: {0}")]
    MissingNode(NodeKey),

    #[error("Invalid attribute on {key}: {message}")]
    InvalidAttribute { key: NodeKey, message: String },
}

/// Options for HTML export
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Put each block on its own indented line
    pub pretty: bool,
    /// Indentation string
    pub indent: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: "  ".to_string(),
        }
    }
}

struct Context<'a> {
    nodes: &'a NodeMap,
    options: ExportOptions,
    depth: usize,
    buffer: String,
}

impl<'a> Context<'a> {
    fn new(nodes: &'a NodeMap, options: ExportOptions) -> Self {
        Self {
            nodes,
            options,
            depth: 0,
            buffer: String::new(),
        }
    }

    fn add(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn add_indent(&mut self) {
        if !self.options.pretty {
            return;
        }
        for _ in 0..self.depth {
            self.buffer.push_str(&self.options.indent);
        }
    }

    fn newline(&mut self) {
        if self.options.pretty {
            self.buffer.push('\n');
        }
    }

    fn node(&self, key: &NodeKey) -> ExportResult<&'a Node> {
        self.nodes
            .get(key)
            .ok_or_else(|| ExportError::MissingNode(key.clone()))
    }

    fn get_output(self) -> String {
        self.buffer
    }
}

/// Render the subtrees rooted at `range`, in order.
///
/// Element children missing from `nodes` are skipped, so a partial copy of a
/// document (only the selected nodes) renders only what it holds.
pub fn export_html(nodes: &NodeMap, range: &[NodeKey], options: ExportOptions) -> ExportResult<String> {
    let mut ctx = Context::new(nodes, options);
    for key in range {
        export_node(key, &mut ctx)?;
    }
    Ok(ctx.get_output())
}

fn export_node(key: &NodeKey, ctx: &mut Context) -> ExportResult<()> {
    let node = ctx.node(key)?;
    match &node.kind {
        NodeKind::Text(text) => {
            export_text(text, ctx);
            Ok(())
        }
        NodeKind::LineBreak => {
            ctx.add("<br>");
            Ok(())
        }
        NodeKind::Decorator(decorator) => {
            ctx.add(&format!(
                "<span data-tessera-decorator=\"{}\"",
                escape_html(node.node_type())
            ));
            if !decorator.inline {
                ctx.add(" style=\"display: block;\"");
            }
            ctx.add("></span>");
            Ok(())
        }
        NodeKind::Element(element) if node.is_root() => export_children(element, ctx),
        NodeKind::Element(element) => export_element(node, element, ctx),
    }
}

fn export_children(element: &ElementNode, ctx: &mut Context) -> ExportResult<()> {
    for child in &element.children {
        if ctx.nodes.contains(child) {
            export_node(child, ctx)?;
        }
    }
    Ok(())
}

fn export_element(node: &Node, element: &ElementNode, ctx: &mut Context) -> ExportResult<()> {
    let tag = tag_name(node)?;
    let mut open = format!("<{tag}");
    for (name, value) in attributes(node, element) {
        open.push_str(&format!(" {}=\"{}\"", name, escape_html(&value)));
    }
    open.push('>');

    if node.is_inline() {
        ctx.add(&open);
        export_children(element, ctx)?;
        ctx.add(&format!("</{tag}>"));
        return Ok(());
    }

    let block_children = element
        .children
        .iter()
        .filter_map(|child| ctx.nodes.get(child))
        .any(Node::is_block);

    ctx.add_indent();
    ctx.add(&open);
    if block_children {
        ctx.newline();
        ctx.depth += 1;
        export_children(element, ctx)?;
        ctx.depth -= 1;
        ctx.add_indent();
    } else {
        export_children(element, ctx)?;
    }
    ctx.add(&format!("</{tag}>"));
    ctx.newline();
    Ok(())
}

fn tag_name(node: &Node) -> ExportResult<String> {
    let tag = match node.node_type() {
        tags::PARAGRAPH => "p",
        tags::QUOTE => "blockquote",
        tags::LIST_ITEM => "li",
        tags::LINK => "a",
        tags::TABLE => "table",
        tags::TABLE_ROW => "tr",
        tags::HEADING => {
            let tag = node.prop_str("tag").unwrap_or("h1");
            if !matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
                return Err(ExportError::InvalidAttribute {
                    key: node.key.clone(),
                    message: format!("heading tag {tag:?}"),
                });
            }
            tag
        }
        tags::LIST => match node.prop_str("listType") {
            Some("number") => "ol",
            _ => "ul",
        },
        tags::TABLE_CELL => {
            if prop_u64(node, "headerState").unwrap_or(0) != 0 {
                "th"
            } else {
                "td"
            }
        }
        _ if node.is_inline() => "span",
        _ => "div",
    };
    Ok(tag.to_string())
}

fn prop_u64(node: &Node, name: &str) -> Option<u64> {
    node.props().and_then(|props| props.get(name)).and_then(Value::as_u64)
}

fn attributes(node: &Node, element: &ElementNode) -> Vec<(&'static str, String)> {
    let mut attrs = Vec::new();
    match node.node_type() {
        tags::LINK => {
            for name in ["href", "rel", "target", "title"] {
                let prop = if name == "href" { "url" } else { name };
                if let Some(value) = node.prop_str(prop) {
                    attrs.push((name, value.to_string()));
                }
            }
        }
        tags::LIST => {
            if node.prop_str("listType") == Some("number") {
                if let Some(start) = prop_u64(node, "start").filter(|start| *start != 1) {
                    attrs.push(("start", start.to_string()));
                }
            }
        }
        tags::LIST_ITEM => {
            if let Some(checked) = node.props().and_then(|props| props.get("checked")).and_then(Value::as_bool) {
                attrs.push(("aria-checked", checked.to_string()));
            }
        }
        tags::TABLE_CELL => {
            for (name, prop) in [("colspan", "colSpan"), ("rowspan", "rowSpan")] {
                if let Some(span) = prop_u64(node, prop).filter(|span| *span > 1) {
                    attrs.push((name, span.to_string()));
                }
            }
        }
        tags::PARAGRAPH | tags::HEADING | tags::QUOTE | tags::TABLE | tags::TABLE_ROW => {}
        other => attrs.push(("data-tessera-type", other.to_string())),
    }

    let mut style = Vec::new();
    if let Some(align) = element.format.as_css() {
        style.push(format!("text-align: {align};"));
    }
    if element.indent > 0 {
        style.push(format!("padding-inline-start: {}px;", element.indent * 40));
    }
    if !style.is_empty() {
        attrs.push(("style", style.join(" ")));
    }
    match element.direction {
        Some(Direction::Ltr) => attrs.push(("dir", "ltr".to_string())),
        Some(Direction::Rtl) => attrs.push(("dir", "rtl".to_string())),
        None => {}
    }
    attrs
}

/// Outermost first.
const FORMAT_TAGS: [(TextFormat, &str); 8] = [
    (TextFormat::CODE, "code"),
    (TextFormat::BOLD, "strong"),
    (TextFormat::ITALIC, "em"),
    (TextFormat::STRIKETHROUGH, "s"),
    (TextFormat::UNDERLINE, "u"),
    (TextFormat::SUBSCRIPT, "sub"),
    (TextFormat::SUPERSCRIPT, "sup"),
    (TextFormat::HIGHLIGHT, "mark"),
];

fn export_text(text: &TextNode, ctx: &mut Context) {
    let active: Vec<&str> = FORMAT_TAGS
        .iter()
        .filter(|(flag, _)| text.format.contains(*flag))
        .map(|(_, tag)| *tag)
        .collect();

    if !text.style.is_empty() {
        ctx.add(&format!("<span style=\"{}\">", escape_html(&text.style)));
    }
    for tag in &active {
        ctx.add(&format!("<{tag}>"));
    }
    ctx.add(&escape_html(&text.text));
    for tag in active.iter().rev() {
        ctx.add(&format!("</{tag}>"));
    }
    if !text.style.is_empty() {
        ctx.add("</span>");
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
