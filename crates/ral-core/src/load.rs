//! Description loader: JSON (or `data.js`-style script) into an [`AddressMap`].
//!
//! The description is the payload produced by the register-map exporter:
//!
//! ```text
//! { "RALIndex": [ { "parent": null, "children": [1], "name": "top",
//!                   "offset": "0", "size": "1000" }, ... ],
//!   "RootNodeIds": [0],
//!   "PageInfo": { "title": "..." } }
//! ```
//!
//! Numeric attributes are hex text and stay undecoded until first use.

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::bigint::ParseIntError;
use crate::index::{AddressMap, ArrayShape, DisplayMode, Field, HexCell, Node, NodeId, NodeKind};

/// Failure to turn a description into an address map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// JSON syntax or schema error.
    #[error("malformed description: {0}")]
    Json(String),
    /// A `var NAME = ...;` script statement could not be split.
    #[error("malformed script statement near byte {offset}")]
    Script {
        /// Byte offset of the statement.
        offset: usize,
    },
    /// The script never assigns `RALIndex`.
    #[error("description has no RALIndex")]
    MissingIndex,
    /// No nodes or no roots.
    #[error("description has no nodes")]
    Empty,
    /// A numeric attribute is not hex text.
    #[error("node {id}: attribute '{attribute}' is not hex: {source}")]
    Hex {
        /// Node carrying the attribute.
        id: NodeId,
        /// Attribute name.
        attribute: String,
        /// Parser diagnosis.
        source: ParseIntError,
    },
    /// A node's id differs from its position.
    #[error("node at position {position} claims id {id}")]
    IdMismatch {
        /// Position in the node list.
        position: usize,
        /// Id stored on the node.
        id: NodeId,
    },
    /// A parent, child, or root reference names no node.
    #[error("reference to missing node {to}")]
    DanglingReference {
        /// Referencing node, `None` for the root list.
        from: Option<NodeId>,
        /// Missing id.
        to: NodeId,
    },
    /// A listed root has a parent.
    #[error("root {id} has a parent")]
    RootHasParent {
        /// Offending root.
        id: NodeId,
    },
    /// A child does not point back at the node listing it.
    #[error("node {child} is listed under {parent} but names another parent")]
    ParentMismatch {
        /// Listing node.
        parent: NodeId,
        /// Listed child.
        child: NodeId,
    },
    /// A node is listed as a child more than once.
    #[error("node {id} is reachable more than once")]
    MultiplyReachable {
        /// Offending node.
        id: NodeId,
    },
    /// A node cannot be reached from any root.
    #[error("node {id} is not reachable from any root")]
    Unreachable {
        /// Offending node.
        id: NodeId,
    },
    /// `dims` without `stride` or the reverse, or an empty/zero extent.
    #[error("node {id} has an invalid array shape")]
    ArrayShape {
        /// Offending node.
        id: NodeId,
    },
    /// A register lists children.
    #[error("register {id} has child nodes")]
    RegisterWithChildren {
        /// Offending node.
        id: NodeId,
    },
    /// A field has `msb < lsb`.
    #[error("node {id}: field '{field}' has msb below lsb")]
    FieldBitRange {
        /// Register node.
        id: NodeId,
        /// Field name.
        field: String,
    },
    /// A field's `disp` is not one of `H`, `D`, `E`, `R`.
    #[error("node {id}: field '{field}' has unknown display mode '{code}'")]
    DisplayMode {
        /// Register node.
        id: NodeId,
        /// Field name.
        field: String,
        /// Unrecognized code.
        code: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawDescription {
    #[serde(rename = "RALIndex")]
    ral_index: Vec<RawNode>,
    #[serde(rename = "RootNodeIds", default)]
    root_node_ids: Option<Vec<NodeId>>,
    #[serde(rename = "PageInfo", default)]
    page_info: Option<RawPageInfo>,
}

#[derive(Debug, Deserialize)]
struct RawPageInfo {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    parent: Option<NodeId>,
    #[serde(default)]
    children: Vec<NodeId>,
    name: String,
    offset: String,
    size: String,
    #[serde(default)]
    dims: Option<Vec<u64>>,
    #[serde(default)]
    stride: Option<String>,
    #[serde(default)]
    idxs: Option<Vec<u64>>,
    #[serde(default)]
    fields: Option<Vec<RawField>>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    lsb: u32,
    msb: u32,
    #[serde(default = "zero_text")]
    reset: String,
    #[serde(default)]
    disp: Option<String>,
    #[serde(default)]
    encode: bool,
    #[serde(default)]
    is_signed: bool,
    #[serde(default)]
    fracwidth: Option<u32>,
}

fn zero_text() -> String {
    "0".to_string()
}

/// Loads a description in either JSON-object or `var X = ...;` script form.
///
/// # Errors
///
/// Returns [`LoadError`] for syntax errors and structural defects.
pub fn load_description(text: &str) -> Result<AddressMap, LoadError> {
    if text.trim_start().starts_with('{') {
        load_json(text)
    } else {
        load_script(text)
    }
}

/// Loads a JSON-object description.
///
/// # Errors
///
/// Returns [`LoadError`] for syntax errors and structural defects.
pub fn load_json(text: &str) -> Result<AddressMap, LoadError> {
    let raw: RawDescription =
        serde_json::from_str(text).map_err(|error| LoadError::Json(error.to_string()))?;
    build(raw)
}

/// Loads a `data.js`-style script of `var NAME = <json>;` statements.
///
/// `RALIndex` is required; `RootNodeIds` and `PageInfo` are optional. Other
/// assignments are ignored. A single assignment of a whole description
/// object is accepted too.
///
/// # Errors
///
/// Returns [`LoadError`] for syntax errors and structural defects.
pub fn load_script(text: &str) -> Result<AddressMap, LoadError> {
    let mut object = serde_json::Map::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let offset = text.len() - rest.len();
        let statement = rest
            .strip_prefix("var ")
            .ok_or(LoadError::Script { offset })?;
        let (name, value_text) = statement
            .split_once('=')
            .ok_or(LoadError::Script { offset })?;

        let mut values =
            serde_json::Deserializer::from_str(value_text).into_iter::<serde_json::Value>();
        let value = values
            .next()
            .ok_or(LoadError::Script { offset })?
            .map_err(|error| LoadError::Json(error.to_string()))?;
        let consumed = values.byte_offset();
        match value {
            // `var data = { "RALIndex": ... };` wraps the whole description.
            serde_json::Value::Object(inner) if inner.contains_key("RALIndex") => {
                object.extend(inner);
            }
            value => {
                object.insert(name.trim().to_string(), value);
            }
        }

        rest = value_text[consumed..].trim_start();
        rest = rest.strip_prefix(';').unwrap_or(rest);
    }

    if !object.contains_key("RALIndex") {
        return Err(LoadError::MissingIndex);
    }
    let raw: RawDescription = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|error| LoadError::Json(error.to_string()))?;
    build(raw)
}

fn hex(id: NodeId, attribute: &str, text: &str) -> Result<HexCell, LoadError> {
    HexCell::parse(text).map_err(|source| LoadError::Hex {
        id,
        attribute: attribute.to_string(),
        source,
    })
}

fn build(raw: RawDescription) -> Result<AddressMap, LoadError> {
    let title = raw.page_info.and_then(|info| info.title);
    let mut nodes = Vec::with_capacity(raw.ral_index.len());
    for (id, entry) in raw.ral_index.into_iter().enumerate() {
        nodes.push(build_node(id, entry)?);
    }

    let roots = raw.root_node_ids.unwrap_or_else(|| {
        nodes
            .iter()
            .filter(|node| node.parent.is_none())
            .map(|node| node.id)
            .collect()
    });

    for node in &nodes {
        if let Some(parent) = node.parent {
            let owner = nodes.get(parent).ok_or(LoadError::DanglingReference {
                from: Some(node.id),
                to: parent,
            })?;
            if !owner.children().contains(&node.id) {
                return Err(LoadError::ParentMismatch {
                    parent,
                    child: node.id,
                });
            }
        }
    }

    let count = nodes.len();
    let map = AddressMap::new(nodes, roots)?.with_title(title);
    debug!("loaded description with {count} nodes");
    Ok(map)
}

fn build_node(id: NodeId, entry: RawNode) -> Result<Node, LoadError> {
    let offset = hex(id, "offset", &entry.offset)?;
    let size = hex(id, "size", &entry.size)?;

    let array = match (entry.dims, entry.stride) {
        (None, None) => None,
        (Some(dims), Some(stride)) => {
            let stride = hex(id, "stride", &stride)?;
            if dims.is_empty() || dims.contains(&0) || stride.is_zero() {
                return Err(LoadError::ArrayShape { id });
            }
            let initial_idxs = match entry.idxs {
                Some(idxs) if idxs.len() == dims.len() => idxs
                    .iter()
                    .zip(&dims)
                    .map(|(&index, &extent)| index.min(extent - 1))
                    .collect(),
                _ => vec![0; dims.len()],
            };
            Some(ArrayShape {
                dims,
                stride,
                initial_idxs,
            })
        }
        _ => return Err(LoadError::ArrayShape { id }),
    };

    let kind = match entry.fields {
        Some(raw_fields) => {
            if !entry.children.is_empty() {
                return Err(LoadError::RegisterWithChildren { id });
            }
            let fields = raw_fields
                .into_iter()
                .map(|field| build_field(id, field))
                .collect::<Result<Vec<_>, _>>()?;
            NodeKind::Register { fields }
        }
        None => NodeKind::Block {
            children: entry.children,
        },
    };

    Ok(Node {
        id,
        parent: entry.parent,
        name: entry.name,
        offset,
        size,
        array,
        kind,
    })
}

fn build_field(id: NodeId, raw: RawField) -> Result<Field, LoadError> {
    if raw.msb < raw.lsb {
        return Err(LoadError::FieldBitRange {
            id,
            field: raw.name,
        });
    }
    let default_disp = match raw.disp.as_deref() {
        None if raw.encode => DisplayMode::Enumerated,
        None => DisplayMode::Hex,
        Some(code) => {
            let mut chars = code.chars();
            match (chars.next().and_then(DisplayMode::from_code), chars.next()) {
                (Some(mode), None) => mode,
                _ => {
                    return Err(LoadError::DisplayMode {
                        id,
                        field: raw.name,
                        code: code.to_string(),
                    })
                }
            }
        }
    };
    let reset = hex(id, &format!("{}.reset", raw.name), &raw.reset)?;
    Ok(Field {
        name: raw.name,
        msb: raw.msb,
        lsb: raw.lsb,
        reset,
        is_signed: raw.is_signed,
        fracwidth: raw.fracwidth,
        encode: raw.encode,
        default_disp,
    })
}
