//! Presentation host interface
//!
//! The reconciler never touches a concrete rendering surface. It drives an
//! object-safe [`PresentationHost`] and refers to the host's nodes through
//! opaque [`PresentationHandle`]s the host issued.

use crate::HostError;
use std::collections::BTreeMap;
use tessera_model::{DecoratorPayload, Node, NodeKey, PointType};

/// Host-issued identifier of one presentation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PresentationHandle(pub u64);

/// Editor-wide settings every hook receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderConfig {
    pub namespace: String,
    /// Node type tag → class name.
    pub theme: BTreeMap<String, String>,
}

impl RenderConfig {
    pub fn class_for(&self, node_type: &str) -> Option<&str> {
        self.theme.get(node_type).map(String::as_str)
    }
}

/// A selection point expressed against presentation handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPoint {
    pub key: NodeKey,
    pub handle: PresentationHandle,
    pub offset: usize,
    pub point_type: PointType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSelection {
    Range {
        anchor: ResolvedPoint,
        focus: ResolvedPoint,
    },
    Node(Vec<PresentationHandle>),
    Grid {
        grid: PresentationHandle,
        anchor_cell: PresentationHandle,
        focus_cell: PresentationHandle,
    },
}

/// A decorator slot whose content the rendering collaborator owns.
#[derive(Debug, Clone)]
pub struct DecoratorSlot {
    pub key: NodeKey,
    pub node_type: String,
    pub handle: PresentationHandle,
    pub payload: Option<DecoratorPayload>,
}

/// Decorators added, changed or removed by one commit.
#[derive(Debug, Clone, Default)]
pub struct DecoratorDelta {
    pub added: Vec<DecoratorSlot>,
    pub changed: Vec<DecoratorSlot>,
    pub removed: Vec<NodeKey>,
}

impl DecoratorDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

pub trait PresentationHost {
    /// Build the presentation of `node` alone; children are inserted separately.
    fn create(&mut self, node: &Node, config: &RenderConfig) -> Result<PresentationHandle, HostError>;

    /// Patch `handle` from `prev` to `next`. Returns `true` when the change
    /// cannot be patched and the node must be recreated instead.
    fn update(
        &mut self,
        prev: &Node,
        next: &Node,
        handle: PresentationHandle,
        config: &RenderConfig,
    ) -> Result<bool, HostError>;

    /// Drop `handle` together with everything still mounted below it.
    fn destroy(&mut self, handle: PresentationHandle) -> Result<(), HostError>;

    fn insert_child(
        &mut self,
        parent: PresentationHandle,
        child: PresentationHandle,
        index: usize,
    ) -> Result<(), HostError>;

    fn remove_child(&mut self, parent: PresentationHandle, child: PresentationHandle) -> Result<(), HostError>;

    /// Move an already mounted child so that it ends up at `to_index`.
    fn move_child(
        &mut self,
        parent: PresentationHandle,
        child: PresentationHandle,
        to_index: usize,
    ) -> Result<(), HostError>;

    /// Forget every presentation node. Precedes a full rebuild.
    fn clear(&mut self) -> Result<(), HostError>;

    fn apply_selection(&mut self, selection: Option<&ResolvedSelection>) -> Result<(), HostError>;

    /// Fire-and-forget hand-off of decorator changes to the rendering collaborator.
    fn decorators_changed(&mut self, delta: DecoratorDelta);
}
