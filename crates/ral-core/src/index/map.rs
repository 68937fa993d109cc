//! Immutable address-map tree and navigation helpers.

use log::debug;

use super::node::{Node, NodeId};
use crate::load::LoadError;
use crate::RalError;

/// The register map: every node plus the designated roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMap {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    title: Option<String>,
}

impl AddressMap {
    /// Builds a map after checking the tree structure.
    ///
    /// Node ids must equal their position in `nodes`, every child must point
    /// back at its parent, and every node must be reachable from exactly one
    /// root.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] describing the first structural defect found.
    pub fn new(nodes: Vec<Node>, roots: Vec<NodeId>) -> Result<Self, LoadError> {
        if nodes.is_empty() || roots.is_empty() {
            return Err(LoadError::Empty);
        }
        for (position, node) in nodes.iter().enumerate() {
            if node.id != position {
                return Err(LoadError::IdMismatch {
                    position,
                    id: node.id,
                });
            }
        }

        let mut seen = vec![false; nodes.len()];
        let mut pending = Vec::new();
        for &root in &roots {
            let node = nodes.get(root).ok_or(LoadError::DanglingReference {
                from: None,
                to: root,
            })?;
            if node.parent.is_some() {
                return Err(LoadError::RootHasParent { id: root });
            }
            pending.push(root);
        }

        while let Some(id) = pending.pop() {
            if seen[id] {
                return Err(LoadError::MultiplyReachable { id });
            }
            seen[id] = true;
            for &child in nodes[id].children() {
                let child_node = nodes.get(child).ok_or(LoadError::DanglingReference {
                    from: Some(id),
                    to: child,
                })?;
                if child_node.parent != Some(id) {
                    return Err(LoadError::ParentMismatch { parent: id, child });
                }
                pending.push(child);
            }
        }

        if let Some(id) = seen.iter().position(|reached| !reached) {
            return Err(LoadError::Unreachable { id });
        }

        debug!("address map built: {} nodes, {} roots", nodes.len(), roots.len());
        Ok(Self {
            nodes,
            roots,
            title: None,
        })
    }

    /// Attaches a display title.
    #[must_use]
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Display title from the description, when present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`; a map holds at least one root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in id order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Designated root ids.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Node by id.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when `id` is out of range.
    pub fn node(&self, id: NodeId) -> Result<&Node, RalError> {
        self.nodes.get(id).ok_or(RalError::UnknownNode { id })
    }

    /// Root whose name matches exactly.
    #[must_use]
    pub fn root_by_name(&self, name: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|&id| self.nodes[id].name == name)
    }

    /// Child of `id` whose name matches exactly.
    #[must_use]
    pub fn child_by_name(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.nodes
            .get(id)?
            .children()
            .iter()
            .copied()
            .find(|&child| self.nodes[child].name == name)
    }

    /// Ancestors of `id`, root first, excluding `id` itself.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when `id` is out of range.
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>, RalError> {
        let mut ids = self.path_ids(id)?;
        ids.pop();
        Ok(ids)
    }

    /// Ids from the root down to and including `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when `id` is out of range.
    pub fn path_ids(&self, id: NodeId) -> Result<Vec<NodeId>, RalError> {
        let mut ids = vec![id];
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            ids.push(parent);
            current = self.node(parent)?;
        }
        ids.reverse();
        Ok(ids)
    }

    /// Deepest node shared by the lineages of `a` and `b`.
    ///
    /// Returns `None` when the nodes sit under different roots.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when either id is out of range.
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Result<Option<NodeId>, RalError> {
        let lineage_a = self.path_ids(a)?;
        let lineage_b = self.path_ids(b)?;
        Ok(lineage_a
            .iter()
            .zip(&lineage_b)
            .take_while(|(x, y)| x == y)
            .last()
            .map(|(id, _)| *id))
    }

    /// Position of the named field in register `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::NotARegister`] when `id` is a block.
    pub fn field_index(&self, id: NodeId, name: &str) -> Result<Option<usize>, RalError> {
        let fields = self
            .node(id)?
            .fields()
            .ok_or(RalError::NotARegister { id })?;
        Ok(fields.iter().position(|field| field.name == name))
    }

    /// Decodes numeric attributes of `id` and its ancestors.
    ///
    /// This is the eager pass run before the first node is displayed.
    ///
    /// # Errors
    ///
    /// Returns [`RalError::UnknownNode`] when `id` is out of range.
    pub fn expand_lineage(&self, id: NodeId) -> Result<usize, RalError> {
        let expanded = self
            .path_ids(id)?
            .into_iter()
            .filter(|&node| self.nodes[node].expand())
            .count();
        debug!("eager expansion of node {id}: {expanded} nodes decoded");
        Ok(expanded)
    }

    /// Decodes numeric attributes of every node not yet decoded.
    ///
    /// Safe to repeat; returns how many nodes this call decoded.
    pub fn expand_all(&self) -> usize {
        let expanded = self.nodes.iter().filter(|node| node.expand()).count();
        debug!("deferred expansion: {expanded} nodes decoded");
        expanded
    }

    /// Whether every node is fully decoded.
    #[must_use]
    pub fn is_fully_expanded(&self) -> bool {
        self.nodes.iter().all(Node::is_expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::AddressMap;
    use crate::index::node::{HexCell, Node, NodeKind};
    use crate::load::LoadError;

    fn block(id: usize, parent: Option<usize>, name: &str, children: Vec<usize>) -> Node {
        Node {
            id,
            parent,
            name: name.to_string(),
            offset: HexCell::parse("0").expect("hex"),
            size: HexCell::parse("100").expect("hex"),
            array: None,
            kind: NodeKind::Block { children },
        }
    }

    fn sample() -> AddressMap {
        AddressMap::new(
            vec![
                block(0, None, "top", vec![1, 2]),
                block(1, Some(0), "a", vec![3]),
                block(2, Some(0), "b", Vec::new()),
                block(3, Some(1), "c", Vec::new()),
                block(4, None, "other", Vec::new()),
            ],
            vec![0, 4],
        )
        .expect("well-formed map")
    }

    #[test]
    fn lineage_helpers_walk_parent_links() {
        let map = sample();
        assert_eq!(map.path_ids(3), Ok(vec![0, 1, 3]));
        assert_eq!(map.ancestors(3), Ok(vec![0, 1]));
        assert_eq!(map.ancestors(0), Ok(Vec::new()));
        assert_eq!(map.common_ancestor(3, 2), Ok(Some(0)));
        assert_eq!(map.common_ancestor(3, 1), Ok(Some(1)));
        assert_eq!(map.common_ancestor(3, 4), Ok(None));
    }

    #[test]
    fn name_lookups_are_exact() {
        let map = sample();
        assert_eq!(map.root_by_name("other"), Some(4));
        assert_eq!(map.root_by_name("a"), None);
        assert_eq!(map.child_by_name(0, "b"), Some(2));
        assert_eq!(map.child_by_name(0, "B"), None);
    }

    #[test]
    fn rejects_child_without_back_reference() {
        let result = AddressMap::new(
            vec![block(0, None, "top", vec![1]), block(1, None, "a", Vec::new())],
            vec![0],
        );
        assert_eq!(result, Err(LoadError::ParentMismatch { parent: 0, child: 1 }));
    }

    #[test]
    fn rejects_unreachable_and_shared_nodes() {
        let unreachable = AddressMap::new(
            vec![block(0, None, "top", Vec::new()), block(1, Some(0), "a", Vec::new())],
            vec![0],
        );
        assert_eq!(unreachable, Err(LoadError::Unreachable { id: 1 }));

        let shared = AddressMap::new(
            vec![block(0, None, "top", vec![1, 1]), block(1, Some(0), "a", Vec::new())],
            vec![0],
        );
        assert_eq!(shared, Err(LoadError::MultiplyReachable { id: 1 }));
    }

    #[test]
    fn expansion_passes_are_idempotent() {
        let map = sample();
        assert_eq!(map.expand_lineage(3), Ok(3));
        assert_eq!(map.expand_lineage(3), Ok(0));
        assert!(!map.is_fully_expanded());
        assert_eq!(map.expand_all(), 2);
        assert_eq!(map.expand_all(), 0);
        assert!(map.is_fully_expanded());
    }
}
