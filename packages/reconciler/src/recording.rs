//! In-memory presentation host
//!
//! Keeps a presentation tree plus a log of every hook call. Cloning a
//! [`RecordingHost`] yields another handle onto the same tree, so a test can
//! hand one clone to an editor and inspect the other.

use crate::host::{
    DecoratorDelta, PresentationHandle, PresentationHost, RenderConfig, ResolvedSelection,
};
use crate::HostError;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::rc::Rc;
use tessera_model::{Node, NodeKey, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    Create { key: NodeKey, handle: PresentationHandle },
    Update { key: NodeKey, handle: PresentationHandle },
    Destroy { handle: PresentationHandle },
    InsertChild { parent: PresentationHandle, child: PresentationHandle, index: usize },
    RemoveChild { parent: PresentationHandle, child: PresentationHandle },
    MoveChild { parent: PresentationHandle, child: PresentationHandle, to_index: usize },
    Clear,
    ApplySelection,
    DecoratorsChanged,
}

impl HostOp {
    /// Operations that change the shape or content of the tree.
    pub fn is_structural(&self) -> bool {
        !matches!(self, HostOp::ApplySelection | HostOp::DecoratorsChanged)
    }
}

#[derive(Debug, Clone)]
pub struct HostNode {
    pub key: NodeKey,
    pub node_type: String,
    pub class: Option<String>,
    pub text: Option<String>,
    pub parent: Option<PresentationHandle>,
    pub children: Vec<PresentationHandle>,
}

#[derive(Debug, Default)]
struct HostTree {
    nodes: HashMap<PresentationHandle, HostNode>,
    root: Option<PresentationHandle>,
    next_handle: u64,
    ops: Vec<HostOp>,
    namespace: String,
    recreate_types: HashSet<String>,
    fail_on: Option<NodeKey>,
    selection: Option<ResolvedSelection>,
    decorator_deltas: Vec<DecoratorDelta>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    tree: Rc<RefCell<HostTree>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates to nodes of this type report "needs recreate".
    pub fn recreate_on_update(&self, node_type: &str) {
        self.tree.borrow_mut().recreate_types.insert(node_type.to_string());
    }

    /// Make create and update hooks fail for `key`.
    pub fn fail_on(&self, key: Option<NodeKey>) {
        self.tree.borrow_mut().fail_on = key;
    }

    pub fn ops(&self) -> Vec<HostOp> {
        self.tree.borrow().ops.clone()
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.tree.borrow_mut().ops)
    }

    pub fn len(&self) -> usize {
        self.tree.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.borrow().nodes.is_empty()
    }

    pub fn namespace(&self) -> String {
        self.tree.borrow().namespace.clone()
    }

    pub fn node(&self, handle: PresentationHandle) -> Option<HostNode> {
        self.tree.borrow().nodes.get(&handle).cloned()
    }

    pub fn selection(&self) -> Option<ResolvedSelection> {
        self.tree.borrow().selection.clone()
    }

    pub fn take_decorator_deltas(&self) -> Vec<DecoratorDelta> {
        std::mem::take(&mut self.tree.borrow_mut().decorator_deltas)
    }

    /// Markup-like dump of the mounted tree, e.g. `<paragraph>Hi<br/></paragraph>`.
    pub fn render(&self) -> String {
        let tree = self.tree.borrow();
        let mut out = String::new();
        if let Some(root) = tree.root {
            tree.render_into(root, &mut out);
        }
        out
    }
}

impl HostTree {
    fn render_into(&self, handle: PresentationHandle, out: &mut String) {
        let Some(node) = self.nodes.get(&handle) else {
            return;
        };
        if let Some(text) = &node.text {
            out.push_str(text);
            return;
        }
        if node.children.is_empty() && node.node_type != "root" {
            let _ = write!(out, "<{}/>", node.node_type);
            return;
        }
        let _ = write!(out, "<{}>", node.node_type);
        for child in &node.children {
            self.render_into(*child, out);
        }
        let _ = write!(out, "</{}>", node.node_type);
    }

    fn check_failure(&self, key: &NodeKey) -> Result<(), HostError> {
        match &self.fail_on {
            Some(failing) if failing == key => Err(HostError::new(format!("hook failed for {key}"))),
            _ => Ok(()),
        }
    }

    fn node_mut(&mut self, handle: PresentationHandle) -> Result<&mut HostNode, HostError> {
        self.nodes
            .get_mut(&handle)
            .ok_or_else(|| HostError::new(format!("unknown handle {handle:?}")))
    }

    fn detach(&mut self, parent: PresentationHandle, child: PresentationHandle) -> Result<(), HostError> {
        let parent_node = self.node_mut(parent)?;
        let Some(index) = parent_node.children.iter().position(|c| *c == child) else {
            return Err(HostError::new(format!("{child:?} is not a child of {parent:?}")));
        };
        parent_node.children.remove(index);
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    fn attach(&mut self, parent: PresentationHandle, child: PresentationHandle, index: usize) -> Result<(), HostError> {
        if self.node_mut(child)?.parent.is_some() {
            return Err(HostError::new(format!("{child:?} is already mounted")));
        }
        let parent_node = self.node_mut(parent)?;
        let index = index.min(parent_node.children.len());
        parent_node.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }
}

fn leaf_text(node: &Node) -> Option<String> {
    match &node.kind {
        NodeKind::Text(text) => Some(text.text.clone()),
        _ => None,
    }
}

impl PresentationHost for RecordingHost {
    fn create(&mut self, node: &Node, config: &RenderConfig) -> Result<PresentationHandle, HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.check_failure(&node.key)?;
        tree.next_handle += 1;
        let handle = PresentationHandle(tree.next_handle);
        tree.namespace = config.namespace.clone();
        tree.nodes.insert(
            handle,
            HostNode {
                key: node.key.clone(),
                node_type: node.node_type().to_string(),
                class: config.class_for(node.node_type()).map(str::to_string),
                text: leaf_text(node),
                parent: None,
                children: Vec::new(),
            },
        );
        if node.is_root() {
            tree.root = Some(handle);
        }
        tree.ops.push(HostOp::Create {
            key: node.key.clone(),
            handle,
        });
        Ok(handle)
    }

    fn update(
        &mut self,
        prev: &Node,
        next: &Node,
        handle: PresentationHandle,
        config: &RenderConfig,
    ) -> Result<bool, HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.check_failure(&next.key)?;
        tree.ops.push(HostOp::Update {
            key: next.key.clone(),
            handle,
        });
        if tree.recreate_types.contains(next.node_type()) || prev.node_type() != next.node_type() {
            return Ok(true);
        }
        let node = tree.node_mut(handle)?;
        node.text = leaf_text(next);
        node.class = config.class_for(next.node_type()).map(str::to_string);
        Ok(false)
    }

    fn destroy(&mut self, handle: PresentationHandle) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        let node = tree
            .nodes
            .remove(&handle)
            .ok_or_else(|| HostError::new(format!("unknown handle {handle:?}")))?;
        let mut stack = node.children;
        while let Some(child) = stack.pop() {
            if let Some(removed) = tree.nodes.remove(&child) {
                stack.extend(removed.children);
            }
        }
        if tree.root == Some(handle) {
            tree.root = None;
        }
        tree.ops.push(HostOp::Destroy { handle });
        Ok(())
    }

    fn insert_child(
        &mut self,
        parent: PresentationHandle,
        child: PresentationHandle,
        index: usize,
    ) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.attach(parent, child, index)?;
        tree.ops.push(HostOp::InsertChild { parent, child, index });
        Ok(())
    }

    fn remove_child(&mut self, parent: PresentationHandle, child: PresentationHandle) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.detach(parent, child)?;
        tree.ops.push(HostOp::RemoveChild { parent, child });
        Ok(())
    }

    fn move_child(
        &mut self,
        parent: PresentationHandle,
        child: PresentationHandle,
        to_index: usize,
    ) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.detach(parent, child)?;
        tree.attach(parent, child, to_index)?;
        tree.ops.push(HostOp::MoveChild {
            parent,
            child,
            to_index,
        });
        Ok(())
    }

    fn clear(&mut self) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.nodes.clear();
        tree.root = None;
        tree.selection = None;
        tree.ops.push(HostOp::Clear);
        Ok(())
    }

    fn apply_selection(&mut self, selection: Option<&ResolvedSelection>) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.selection = selection.cloned();
        tree.ops.push(HostOp::ApplySelection);
        Ok(())
    }

    fn decorators_changed(&mut self, delta: DecoratorDelta) {
        let mut tree = self.tree.borrow_mut();
        tree.decorator_deltas.push(delta);
        tree.ops.push(HostOp::DecoratorsChanged);
    }
}
