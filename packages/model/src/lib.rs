//! # Tessera Model
//!
//! Document model shared by the editor, the reconciler and the exporters.
//!
//! ## Layout
//!
//! ```text
//! EditorState
//!  ├── NodeMap        key → Arc<Node>, flat arena, copy-on-write
//!  │    └── Node      key, parent key, type tag, payload
//!  │         ├── Element    child keys, alignment, indent, direction, props
//!  │         ├── Text       string, format bits, mode, detail, style
//!  │         ├── LineBreak
//!  │         └── Decorator  props rendered by an outside collaborator
//!  └── Selection      Range | Node | Grid
//! ```
//!
//! Tree edges are keys resolved against a specific map, never references, so
//! a pending draft can share every untouched node with the committed state it
//! was cloned from.

mod dirty;
mod element;
mod error;
mod grid;
mod key;
mod node;
mod node_map;
mod registry;
mod selection;
mod serialize;
mod state;
mod text;

pub use dirty::{DirtySet, ElementDirt};
pub use element::{
    DecoratorNode, Direction, ElementCapabilities, ElementFormat, ElementNode, Props,
};
pub use error::{ModelError, ModelResult};
pub use grid::{cell_coordinates, grid_bounds, grid_nodes, grid_text_content};
pub use key::{KeyGenerator, NodeKey, ROOT_KEY};
pub use node::{tags, Node, NodeKind};
pub use node_map::NodeMap;
pub use registry::{
    DecorateFn, DecoratorPayload, DomConversion, ImportJsonFn, NodeClass, NodeRegistry,
    NodeTypeDescriptor, ROOT_CAPS,
};
pub use selection::{
    compare_points, nodes_between, normalize_point, point_after_removal, point_at_end,
    point_at_start, GridSelection, NodeSelection, Point, PointType, RangeSelection, Selection,
};
pub use serialize::{
    export_node, import_document, import_node, parse_element_format, SerializedDocument,
    SerializedNode, DOCUMENT_VERSION, NODE_VERSION,
};
pub use state::EditorState;
pub use text::{byte_index, TextDetail, TextFormat, TextMode, TextNode};
