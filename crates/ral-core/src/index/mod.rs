//! Address-map index: the node tree built once from a description.

/// Immutable tree container and navigation helpers.
pub mod map;
/// Node, field, and display-mode records.
pub mod node;

pub use map::AddressMap;
pub use node::{ArrayShape, DisplayMode, Field, HexCell, Node, NodeId, NodeKind};

/// Per-node array indices from the root down to a node, outermost first.
///
/// Scalar nodes contribute an empty entry, so the stack always has one entry
/// per node on the path.
pub type IndexStack = Vec<Vec<u64>>;
