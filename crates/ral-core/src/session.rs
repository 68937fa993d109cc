//! Mutable view state over an [`AddressMap`].
//!
//! The map itself never changes after load. Which array element is being
//! viewed, how each field is displayed, and which node is active live here
//! and are passed explicitly to the resolver, path codec, and tester.

use log::{debug, warn};

use crate::config::RalConfig;
use crate::index::{AddressMap, DisplayMode, IndexStack, NodeId};
use crate::path::{decode_path, encode_path};
use crate::RalError;

/// Current selection state for one address map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    config: RalConfig,
    current: NodeId,
    idxs: Vec<Vec<u64>>,
    disp: Vec<Vec<DisplayMode>>,
}

/// Outcome of [`Session::open_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedPath {
    /// Node now active.
    pub id: NodeId,
    /// Canonical path of the active node with its current indices.
    pub path: String,
    /// The requested path was invalid and the first root was opened instead.
    pub discarded: bool,
}

impl OpenedPath {
    /// Whether the caller should replace its copy of the path text.
    #[must_use]
    pub fn rewritten(&self, requested: &str) -> bool {
        self.path != requested
    }
}

impl Session {
    /// Starts a session with default configuration.
    #[must_use]
    pub fn new(map: &AddressMap) -> Self {
        Self::with_config(map, RalConfig::default())
    }

    /// Starts a session with the first root active and description-supplied
    /// indices and display modes.
    #[must_use]
    pub fn with_config(map: &AddressMap, config: RalConfig) -> Self {
        let idxs = map
            .nodes()
            .iter()
            .map(|node| {
                node.array
                    .as_ref()
                    .map(|shape| shape.initial_idxs.clone())
                    .unwrap_or_default()
            })
            .collect();
        let disp = map
            .nodes()
            .iter()
            .map(|node| {
                node.fields()
                    .map(|fields| fields.iter().map(|field| field.default_disp).collect())
                    .unwrap_or_default()
            })
            .collect();
        if config.eager_expansion {
            map.expand_all();
        }
        Self {
            config,
            current: map.roots()[0],
            idxs,
            disp,
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &RalConfig {
        &self.config
    }

    /// Active node.
    #[must_use]
    pub const fn current(&self) -> NodeId {
        self.current
    }

    /// Current indices of `id`; empty for scalar nodes.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when `id` is out of range.
    pub fn idxs(&self, id: NodeId) -> Result<&[u64], RalError> {
        self.idxs
            .get(id)
            .map(Vec::as_slice)
            .ok_or(RalError::UnknownNode { id })
    }

    /// Replaces the indices of array node `id`, clamping each to its extent.
    ///
    /// # Errors
    ///
    /// Fails for scalar nodes and for a vector of the wrong length.
    pub fn set_idxs(&mut self, map: &AddressMap, id: NodeId, idxs: &[u64]) -> Result<(), RalError> {
        let dims = map.node(id)?.dims().ok_or(RalError::NotAnArray { id })?;
        if idxs.len() != dims.len() {
            return Err(RalError::IndexArity {
                id,
                expected: dims.len(),
                actual: idxs.len(),
            });
        }
        let clamped: Vec<u64> = idxs
            .iter()
            .zip(dims)
            .map(|(&index, &extent)| index.min(extent - 1))
            .collect();
        if clamped != idxs {
            warn!("node {id}: indices {idxs:?} clamped to {clamped:?}");
        }
        *self.idxs_mut(id)? = clamped;
        Ok(())
    }

    /// Sets one dimension of array node `id`, clamping to the extent.
    ///
    /// Returns the index actually stored.
    ///
    /// # Errors
    ///
    /// Fails for scalar nodes and for a dimension past the last one.
    pub fn set_index(
        &mut self,
        map: &AddressMap,
        id: NodeId,
        dim: usize,
        value: u64,
    ) -> Result<u64, RalError> {
        let dims = map.node(id)?.dims().ok_or(RalError::NotAnArray { id })?;
        let extent = *dims.get(dim).ok_or(RalError::IndexArity {
            id,
            expected: dims.len(),
            actual: dim + 1,
        })?;
        let stored = value.min(extent - 1);
        let slot = self
            .idxs_mut(id)?
            .get_mut(dim)
            .ok_or(RalError::NotAnArray { id })?;
        *slot = stored;
        Ok(stored)
    }

    /// Index stack built from current indices of every node on the path.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when `id` is out of range.
    pub fn current_index_stack(&self, map: &AddressMap, id: NodeId) -> Result<IndexStack, RalError> {
        map.path_ids(id)?
            .into_iter()
            .map(|node| self.idxs(node).map(<[u64]>::to_vec))
            .collect()
    }

    /// Zeroes indices of array nodes from `to` up to, but excluding, `from`.
    ///
    /// When `from` is not an ancestor of `to`, the walk continues to the root
    /// (the root itself is left alone).
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when `to` is out of range.
    pub fn reset_indexes(
        &mut self,
        map: &AddressMap,
        from: Option<NodeId>,
        to: NodeId,
    ) -> Result<(), RalError> {
        let mut id = to;
        loop {
            let node = map.node(id)?;
            let Some(parent) = node.parent else {
                break;
            };
            if Some(id) == from {
                break;
            }
            self.idxs_mut(id)?.iter_mut().for_each(|index| *index = 0);
            id = parent;
        }
        Ok(())
    }

    /// Makes `id` the active node.
    ///
    /// Array nodes newly entered on the path (below the common ancestor with
    /// the previously active node) start over at index 0.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when `id` is out of range.
    pub fn navigate_to(&mut self, map: &AddressMap, id: NodeId) -> Result<(), RalError> {
        let common = map.common_ancestor(id, self.current)?;
        self.reset_indexes(map, common, id)?;
        debug!("navigate {} -> {id}", self.current);
        self.current = id;
        Ok(())
    }

    /// Opens a user-supplied path: decodes, applies its indices, activates it.
    ///
    /// An invalid path falls back to the first root. The returned canonical
    /// path lets the caller patch a bookmark or URL that needed sanitizing.
    ///
    /// # Errors
    ///
    /// Only internal inconsistencies surface; malformed text never errors.
    pub fn open_path(&mut self, map: &AddressMap, text: &str) -> Result<OpenedPath, RalError> {
        let (id, discarded) = match decode_path(map, text) {
            Some(decoded) => {
                map.expand_lineage(decoded.id)?;
                self.apply_index_stack(map, decoded.id, &decoded.stack)?;
                (decoded.id, false)
            }
            None => {
                warn!("discarding invalid path {text:?}");
                (map.roots()[0], true)
            }
        };
        self.current = id;
        let path = encode_path(map, self, id, None)?;
        Ok(OpenedPath {
            id,
            path,
            discarded,
        })
    }

    /// Writes each non-empty stack entry onto the matching array node of the
    /// path to `id`. Empty entries leave state untouched.
    ///
    /// # Errors
    ///
    /// Fails when the stack depth differs from the path length or an entry
    /// has the wrong arity.
    pub fn apply_index_stack(
        &mut self,
        map: &AddressMap,
        id: NodeId,
        stack: &[Vec<u64>],
    ) -> Result<(), RalError> {
        let ids = map.path_ids(id)?;
        if ids.len() != stack.len() {
            return Err(RalError::StackDepth {
                id,
                expected: ids.len(),
                actual: stack.len(),
            });
        }
        for (&node, entry) in ids.iter().zip(stack) {
            if entry.is_empty() || map.node(node)?.dims().is_none() {
                continue;
            }
            self.set_idxs(map, node, entry)?;
        }
        Ok(())
    }

    /// Display mode of field `index` of register `id`.
    ///
    /// # Errors
    ///
    /// Fails for blocks and for a missing field.
    pub fn display_mode(&self, id: NodeId, index: usize) -> Result<DisplayMode, RalError> {
        self.register_modes(id)?
            .get(index)
            .copied()
            .ok_or(RalError::UnknownField { id, index })
    }

    /// Display modes of every field of register `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when `id` is out of range.
    pub fn register_modes(&self, id: NodeId) -> Result<&[DisplayMode], RalError> {
        self.disp
            .get(id)
            .map(Vec::as_slice)
            .ok_or(RalError::UnknownNode { id })
    }

    /// Sets the display mode of field `index` of register `id`.
    ///
    /// # Errors
    ///
    /// Fails for blocks and for a missing field.
    pub fn set_display_mode(
        &mut self,
        map: &AddressMap,
        id: NodeId,
        index: usize,
        mode: DisplayMode,
    ) -> Result<(), RalError> {
        let fields = map.node(id)?.fields().ok_or(RalError::NotARegister { id })?;
        if index >= fields.len() {
            return Err(RalError::UnknownField { id, index });
        }
        *self.mode_mut(id, index)? = mode;
        Ok(())
    }

    /// Advances field `index` of register `id` to its next display mode.
    ///
    /// # Errors
    ///
    /// Fails for blocks and for a missing field.
    pub fn cycle_display_mode(
        &mut self,
        map: &AddressMap,
        id: NodeId,
        index: usize,
    ) -> Result<DisplayMode, RalError> {
        let fields = map.node(id)?.fields().ok_or(RalError::NotARegister { id })?;
        let field = fields.get(index).ok_or(RalError::UnknownField { id, index })?;
        let slot = self.mode_mut(id, index)?;
        let next = slot.next(field);
        *slot = next;
        Ok(next)
    }

    fn idxs_mut(&mut self, id: NodeId) -> Result<&mut Vec<u64>, RalError> {
        self.idxs.get_mut(id).ok_or(RalError::UnknownNode { id })
    }

    fn mode_mut(&mut self, id: NodeId, index: usize) -> Result<&mut DisplayMode, RalError> {
        self.disp
            .get_mut(id)
            .ok_or(RalError::UnknownNode { id })?
            .get_mut(index)
            .ok_or(RalError::UnknownField { id, index })
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use crate::config::RalConfig;
    use crate::index::DisplayMode;
    use crate::load::load_description;
    use crate::RalError;

    const NESTED: &str = r#"{"RALIndex": [
        {"parent": null, "children": [1, 3], "name": "top", "offset": "0", "size": "10000"},
        {"parent": 0, "children": [2], "name": "bank", "offset": "0", "size": "100",
         "dims": [4], "stride": "100"},
        {"parent": 1, "children": [], "name": "ctrl", "offset": "10", "size": "4",
         "dims": [2, 3], "stride": "4",
         "fields": [{"name": "en", "lsb": 0, "msb": 0, "reset": "0"},
                    {"name": "lvl", "lsb": 4, "msb": 11, "reset": "0", "encode": true, "fracwidth": 4}]},
        {"parent": 0, "children": [], "name": "status", "offset": "1000", "size": "4",
         "fields": [{"name": "busy", "lsb": 0, "msb": 0, "reset": "0"}]}
    ], "RootNodeIds": [0]}"#;

    fn setup() -> (crate::AddressMap, Session) {
        let map = load_description(NESTED).expect("valid description");
        let session = Session::new(&map);
        (map, session)
    }

    #[test]
    fn starts_at_first_root_with_zero_indices() {
        let (map, session) = setup();
        assert_eq!(session.current(), 0);
        assert_eq!(session.idxs(1), Ok(&[0_u64][..]));
        assert_eq!(session.idxs(2), Ok(&[0_u64, 0][..]));
        assert_eq!(session.idxs(0), Ok(&[][..]));
        assert_eq!(
            session.current_index_stack(&map, 2),
            Ok(vec![vec![], vec![0], vec![0, 0]])
        );
    }

    #[test]
    fn index_setters_clamp_to_extent() {
        let (map, mut session) = setup();
        assert_eq!(session.set_index(&map, 2, 1, 99), Ok(2));
        session.set_idxs(&map, 1, &[10]).expect("array node");
        assert_eq!(session.idxs(1), Ok(&[3_u64][..]));
        assert_eq!(
            session.set_idxs(&map, 0, &[1]),
            Err(RalError::NotAnArray { id: 0 })
        );
        assert_eq!(
            session.set_idxs(&map, 2, &[1]),
            Err(RalError::IndexArity {
                id: 2,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn apply_index_stack_skips_empty_entries() {
        let (map, mut session) = setup();
        session.set_idxs(&map, 1, &[2]).expect("array node");
        session
            .apply_index_stack(&map, 2, &[vec![], vec![], vec![1, 2]])
            .expect("valid stack");
        assert_eq!(session.idxs(1), Ok(&[2_u64][..]));
        assert_eq!(session.idxs(2), Ok(&[1_u64, 2][..]));

        assert!(matches!(
            session.apply_index_stack(&map, 2, &[vec![]]),
            Err(RalError::StackDepth { .. })
        ));
    }

    #[test]
    fn navigation_resets_indices_below_common_ancestor() {
        let (map, mut session) = setup();
        session.navigate_to(&map, 1).expect("known node");
        session.set_idxs(&map, 1, &[3]).expect("array node");
        session.set_idxs(&map, 2, &[1, 1]).expect("array node");

        // Moving down into ctrl keeps bank's selection but restarts ctrl.
        session.navigate_to(&map, 2).expect("known node");
        assert_eq!(session.idxs(1), Ok(&[3_u64][..]));
        assert_eq!(session.idxs(2), Ok(&[0_u64, 0][..]));

        // Moving to a sibling subtree and back restarts bank as well.
        session.navigate_to(&map, 3).expect("known node");
        session.set_idxs(&map, 2, &[1, 1]).expect("array node");
        session.navigate_to(&map, 2).expect("known node");
        assert_eq!(session.idxs(1), Ok(&[0_u64][..]));
        assert_eq!(session.idxs(2), Ok(&[0_u64, 0][..]));
    }

    #[test]
    fn open_path_sanitizes_and_falls_back() {
        let (map, mut session) = setup();
        let opened = session.open_path(&map, "top.bank[9].ctrl[1]").expect("opens");
        assert_eq!(opened.id, 2);
        assert_eq!(opened.path, "top.bank[3].ctrl[1][0]");
        assert!(!opened.discarded);
        assert!(opened.rewritten("top.bank[9].ctrl[1]"));
        assert_eq!(session.current(), 2);

        let fallback = session.open_path(&map, "nope.bank").expect("falls back");
        assert_eq!(fallback.id, 0);
        assert_eq!(fallback.path, "top");
        assert!(fallback.discarded);
    }

    #[test]
    fn display_modes_cycle_per_field() {
        let (map, mut session) = setup();
        assert_eq!(session.display_mode(2, 1), Ok(DisplayMode::Enumerated));
        assert_eq!(session.cycle_display_mode(&map, 2, 1), Ok(DisplayMode::Real));
        assert_eq!(session.cycle_display_mode(&map, 2, 1), Ok(DisplayMode::Hex));
        assert_eq!(session.cycle_display_mode(&map, 2, 1), Ok(DisplayMode::Decimal));
        assert_eq!(
            session.cycle_display_mode(&map, 1, 0),
            Err(RalError::NotARegister { id: 1 })
        );
        assert_eq!(
            session.display_mode(2, 5),
            Err(RalError::UnknownField { id: 2, index: 5 })
        );
    }

    #[test]
    fn foreign_map_is_rejected_without_panicking() {
        fn unknown<T>(id: usize) -> Result<T, RalError> {
            Err(RalError::UnknownNode { id })
        }

        let (map, _) = setup();
        let small = load_description(
            r#"{"RALIndex": [{"parent": null, "children": [], "name": "solo",
                "offset": "0", "size": "4"}], "RootNodeIds": [0]}"#,
        )
        .expect("valid description");
        let mut session = Session::new(&small);

        assert_eq!(session.set_idxs(&map, 1, &[2]), unknown(1));
        assert_eq!(session.set_index(&map, 2, 0, 1), unknown(2));
        assert_eq!(session.navigate_to(&map, 2), unknown(2));
        assert_eq!(session.cycle_display_mode(&map, 2, 1), unknown(2));
        assert_eq!(
            session.set_display_mode(&map, 3, 0, DisplayMode::Hex),
            unknown(3)
        );
        assert!(matches!(
            session.current_index_stack(&map, 2),
            Err(RalError::UnknownNode { .. })
        ));
    }

    #[test]
    fn eager_config_expands_everything() {
        let map = load_description(NESTED).expect("valid description");
        let config = RalConfig {
            eager_expansion: true,
            ..RalConfig::default()
        };
        let session = Session::with_config(&map, config);
        assert!(map.is_fully_expanded());
        assert!(session.config().eager_expansion);
    }
}
