//! Dotted, bracket-indexed node paths such as `soc.uart[2].ctrl`.
//!
//! Grammar: `segment ("." segment)*` with `segment = name ("[" digits "]")*`.
//! No whitespace or signs are accepted anywhere. Out-of-range indices are
//! clamped rather than rejected, so any structurally valid path that names
//! existing nodes decodes.

use std::fmt::Write as _;

use log::debug;
use num_bigint::BigUint;
use thiserror::Error;

use crate::bigint::parse_digits;
use crate::index::{AddressMap, IndexStack, NodeId};
use crate::session::Session;
use crate::RalError;

/// Why a path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum PathError {
    /// Input was empty.
    #[error("empty path")]
    Empty,
    /// Whitespace appeared in the path.
    #[error("whitespace at byte {offset}")]
    Whitespace {
        /// Byte offset of the first whitespace character.
        offset: usize,
    },
    /// Two dots in a row, or a leading or trailing dot.
    #[error("empty segment at position {position}")]
    EmptySegment {
        /// Zero-based segment position.
        position: usize,
    },
    /// Segment has brackets but no name.
    #[error("segment {segment:?} has no name")]
    MissingName {
        /// Offending segment text.
        segment: String,
    },
    /// Bracket group is unterminated, empty, or not decimal digits.
    #[error("malformed index in segment {segment:?}")]
    MalformedIndex {
        /// Offending segment text.
        segment: String,
    },
    /// First segment does not name a root.
    #[error("no root named {name:?}")]
    UnknownRoot {
        /// Name searched for.
        name: String,
    },
    /// Segment does not name a child of the previous node.
    #[error("node {parent} has no child named {name:?}")]
    UnknownChild {
        /// Node whose children were searched.
        parent: NodeId,
        /// Name searched for.
        name: String,
    },
}

/// Node and sanitized index stack recovered from a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPath {
    /// Node named by the last segment.
    pub id: NodeId,
    /// Clamped indices, one entry per node on the path.
    pub stack: IndexStack,
}

struct Segment<'a> {
    name: &'a str,
    idxs: Vec<BigUint>,
}

fn split_segment(segment: &str) -> Result<Segment<'_>, PathError> {
    let malformed = || PathError::MalformedIndex {
        segment: segment.to_string(),
    };
    let (name, mut rest) = segment.find('[').map_or((segment, ""), |at| segment.split_at(at));
    if name.is_empty() {
        return Err(PathError::MissingName {
            segment: segment.to_string(),
        });
    }
    if name.contains(']') {
        return Err(malformed());
    }

    let mut idxs = Vec::new();
    while !rest.is_empty() {
        let body = rest.strip_prefix('[').ok_or_else(malformed)?;
        let close = body.find(']').ok_or_else(malformed)?;
        let digits = &body[..close];
        idxs.push(parse_digits(digits, 10).map_err(|_| malformed())?);
        rest = &body[close + 1..];
    }
    Ok(Segment { name, idxs })
}

fn clamp_index(value: Option<&BigUint>, extent: u64) -> u64 {
    let last = extent.saturating_sub(1);
    value.map_or(0, |value| u64::try_from(value).map_or(last, |value| value.min(last)))
}

/// Parses `text` against `map`, reporting why it was rejected.
///
/// # Errors
///
/// Returns [`PathError`] for malformed syntax or names that do not resolve.
pub fn parse_path(map: &AddressMap, text: &str) -> Result<DecodedPath, PathError> {
    if text.is_empty() {
        return Err(PathError::Empty);
    }
    if let Some(offset) = text.find(char::is_whitespace) {
        return Err(PathError::Whitespace { offset });
    }

    let mut segments = Vec::new();
    for (position, segment) in text.split('.').enumerate() {
        if segment.is_empty() {
            return Err(PathError::EmptySegment { position });
        }
        segments.push(split_segment(segment)?);
    }

    let mut id = None;
    let mut stack = IndexStack::with_capacity(segments.len());
    for segment in &segments {
        let next = match id {
            None => map.root_by_name(segment.name).ok_or_else(|| PathError::UnknownRoot {
                name: segment.name.to_string(),
            })?,
            Some(parent) => {
                map.child_by_name(parent, segment.name)
                    .ok_or_else(|| PathError::UnknownChild {
                        parent,
                        name: segment.name.to_string(),
                    })?
            }
        };
        let entry = map.nodes()[next].dims().map_or_else(Vec::new, |dims| {
            dims.iter()
                .enumerate()
                .map(|(dim, &extent)| clamp_index(segment.idxs.get(dim), extent))
                .collect()
        });
        stack.push(entry);
        id = Some(next);
    }

    // Non-empty input always yields at least one segment.
    let id = id.ok_or(PathError::Empty)?;
    Ok(DecodedPath { id, stack })
}

/// Parses `text`; `None` when it is malformed or names no node.
///
/// The rejection reason is logged at debug level.
#[must_use]
pub fn decode_path(map: &AddressMap, text: &str) -> Option<DecodedPath> {
    parse_path(map, text)
        .map_err(|reason| debug!("rejected path {text:?}: {reason}"))
        .ok()
}

/// Canonical path of `id` with indices from `stack`, or from the session's
/// current indices when `stack` is `None`.
///
/// Supplied stacks are printed as given, without clamping.
///
/// # Errors
///
/// Fails for an unknown node or a stack whose depth differs from the path.
pub fn encode_path(
    map: &AddressMap,
    session: &Session,
    id: NodeId,
    stack: Option<&[Vec<u64>]>,
) -> Result<String, RalError> {
    let ids = map.path_ids(id)?;
    let current;
    let stack = if let Some(stack) = stack {
        stack
    } else {
        current = session.current_index_stack(map, id)?;
        current.as_slice()
    };
    if stack.len() != ids.len() {
        return Err(RalError::StackDepth {
            id,
            expected: ids.len(),
            actual: stack.len(),
        });
    }

    let mut path = String::new();
    for (position, (&node, entry)) in ids.iter().zip(stack).enumerate() {
        if position > 0 {
            path.push('.');
        }
        path.push_str(&map.nodes()[node].name);
        for index in entry {
            let _ = write!(path, "[{index}]");
        }
    }
    Ok(path)
}

/// Path of `id` without any indices.
///
/// # Errors
///
/// Returns [`RalError::UnknownNode`] when `id` is out of range.
pub fn encode_path_plain(map: &AddressMap, id: NodeId) -> Result<String, RalError> {
    let names: Vec<&str> = map
        .path_ids(id)?
        .into_iter()
        .map(|node| map.nodes()[node].name.as_str())
        .collect();
    Ok(names.join("."))
}

/// Writes every non-empty entry of `stack` onto the array nodes on the path
/// to `id`. See [`Session::apply_index_stack`].
///
/// # Errors
///
/// Fails when the stack depth differs from the path length.
pub fn apply_index_stack(
    map: &AddressMap,
    session: &mut Session,
    id: NodeId,
    stack: &[Vec<u64>],
) -> Result<(), RalError> {
    session.apply_index_stack(map, id, stack)
}
