//! Address arithmetic over the address map.
//!
//! Array elements are flattened row-major: the last dimension varies fastest
//! and element `flat` sits at `offset + stride * flat`.

use log::{debug, error};
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::Zero;

use crate::bigint::format_hex;
use crate::index::{AddressMap, IndexStack, Node, NodeId};
use crate::session::Session;
use crate::RalError;

/// A node instance found by [`resolve_address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Deepest node containing the address.
    pub id: NodeId,
    /// Indices for each node on the path to `id`, root first.
    pub stack: IndexStack,
}

/// Row-major flat position of `idxs` within `dims`.
///
/// # Errors
///
/// Fails when the lengths differ or an index is outside its extent.
pub fn flatten_index(id: NodeId, dims: &[u64], idxs: &[u64]) -> Result<BigUint, RalError> {
    if dims.len() != idxs.len() {
        return Err(RalError::IndexArity {
            id,
            expected: dims.len(),
            actual: idxs.len(),
        });
    }
    let mut flat = BigUint::zero();
    for (dim, (&extent, &index)) in dims.iter().zip(idxs).enumerate() {
        if index >= extent {
            return Err(RalError::IndexOutOfRange {
                id,
                dim,
                index,
                extent,
            });
        }
        flat = flat * extent + index;
    }
    Ok(flat)
}

/// Splits a flat position back into per-dimension indices, innermost first.
///
/// Each index is reduced modulo its extent, so an oversized `flat` wraps
/// rather than producing an out-of-range index.
#[must_use]
pub fn unflatten_index(dims: &[u64], flat: &BigUint) -> Vec<u64> {
    let mut rest = flat.clone();
    let mut idxs = vec![0; dims.len()];
    for (slot, &extent) in idxs.iter_mut().zip(dims).rev() {
        let (quotient, remainder) = rest.div_rem(&BigUint::from(extent));
        *slot = u64::try_from(&remainder).unwrap_or_default();
        rest = quotient;
    }
    idxs
}

fn offset_with(node: &Node, idxs: &[u64]) -> Result<BigUint, RalError> {
    match (&node.array, node.stride()) {
        (Some(shape), Some(stride)) => {
            let flat = flatten_index(node.id, &shape.dims, idxs)?;
            Ok(node.offset() + stride * flat)
        }
        _ => Ok(node.offset().clone()),
    }
}

/// Offset of `id` within its parent for the current or supplied indices.
///
/// Scalar nodes ignore `idx_override` and return their offset.
///
/// # Errors
///
/// Fails for an unknown node, or an index vector of the wrong length or
/// containing an out-of-range index.
pub fn address_offset(
    map: &AddressMap,
    session: &Session,
    id: NodeId,
    idx_override: Option<&[u64]>,
) -> Result<BigUint, RalError> {
    let node = map.node(id)?;
    let idxs = match idx_override {
        Some(idxs) => idxs,
        None => session.idxs(id)?,
    };
    offset_with(node, idxs)
}

/// Absolute address of `id` using the session's current indices.
///
/// # Errors
///
/// Returns [`RalError::UnknownNode`] when `id` is out of range.
pub fn absolute_address(
    map: &AddressMap,
    session: &Session,
    id: NodeId,
) -> Result<BigUint, RalError> {
    let mut address = BigUint::zero();
    for node in map.path_ids(id)? {
        address += address_offset(map, session, node, None)?;
    }
    Ok(address)
}

/// Absolute address of `id` for an explicit index stack.
///
/// Empty entries fall back to the session's current indices.
///
/// # Errors
///
/// Fails when the stack depth differs from the path length or an entry is
/// out of range.
pub fn absolute_address_with(
    map: &AddressMap,
    session: &Session,
    id: NodeId,
    stack: &[Vec<u64>],
) -> Result<BigUint, RalError> {
    let ids = map.path_ids(id)?;
    if ids.len() != stack.len() {
        return Err(RalError::StackDepth {
            id,
            expected: ids.len(),
            actual: stack.len(),
        });
    }
    let mut address = BigUint::zero();
    for (&node, entry) in ids.iter().zip(stack) {
        let idxs = if entry.is_empty() {
            None
        } else {
            Some(entry.as_slice())
        };
        address += address_offset(map, session, node, idxs)?;
    }
    Ok(address)
}

/// Span of every element of `id`: `stride * (elements - 1) + size`.
///
/// # Errors
///
/// Returns [`RalError::UnknownNode`] when `id` is out of range.
pub fn footprint(map: &AddressMap, id: NodeId) -> Result<BigUint, RalError> {
    Ok(map.node(id)?.footprint())
}

/// Deepest node under `root` containing `address`, capped by the session's
/// configured lookup limit.
///
/// # Errors
///
/// See [`resolve_address_with_limit`].
pub fn resolve_address(
    map: &AddressMap,
    session: &Session,
    address: &BigUint,
    root: NodeId,
) -> Result<Option<Resolved>, RalError> {
    resolve_address_with_limit(map, address, root, session.config().lookup_iteration_limit)
}

/// Deepest node under `root` containing `address`.
///
/// Returns `Ok(None)` when the address lies outside the root's footprint, or
/// in the padding between elements of an arrayed root. Padding between the
/// elements of a deeper array attributes the address to that array's parent.
///
/// # Errors
///
/// Returns [`RalError::IterationLimit`] when the descent exceeds `limit`
/// levels, which only happens for a corrupt map.
pub fn resolve_address_with_limit(
    map: &AddressMap,
    address: &BigUint,
    root: NodeId,
    limit: usize,
) -> Result<Option<Resolved>, RalError> {
    let mut node = map.node(root)?;
    if address < node.offset() || *address >= node.offset() + node.footprint() {
        debug!("address {} outside root {root}", format_hex(address));
        return Ok(None);
    }

    let mut rel = address.clone();
    let mut stack = IndexStack::new();
    for _ in 0..limit {
        rel -= node.offset();

        match (&node.array, node.stride()) {
            (Some(shape), Some(stride)) => {
                let (flat, within) = rel.div_rem(stride);
                if within >= *node.size() {
                    return Ok(node.parent.map(|parent| Resolved { id: parent, stack }));
                }
                stack.push(unflatten_index(&shape.dims, &flat));
                rel = within;
            }
            _ => stack.push(Vec::new()),
        }

        let hit = node.children().iter().copied().find(|&child| {
            let child = &map.nodes()[child];
            rel >= *child.offset() && rel < child.offset() + child.footprint()
        });
        match hit {
            Some(child) => node = map.node(child)?,
            None => return Ok(Some(Resolved { id: node.id, stack })),
        }
    }

    let address = format_hex(address);
    error!("iteration limit of {limit} reached while looking up {address}");
    Err(RalError::IterationLimit { limit, address })
}
