use thiserror::Error;

use crate::NodeId;

/// Failures raised by resolver, path, and session operations.
///
/// User-supplied paths and values never produce these; they are either
/// clamped or reported through [`crate::PathError`] and [`crate::FieldError`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum RalError {
    /// Node id is not part of the address map.
    #[error("node {id} does not exist")]
    UnknownNode {
        /// Requested id.
        id: NodeId,
    },
    /// Operation needs a register but the node is a block.
    #[error("node {id} is not a register")]
    NotARegister {
        /// Offending node.
        id: NodeId,
    },
    /// Operation needs an array node but the node is scalar.
    #[error("node {id} is not an array")]
    NotAnArray {
        /// Offending node.
        id: NodeId,
    },
    /// Field index past the end of the register's field list.
    #[error("register {id} has no field {index}")]
    UnknownField {
        /// Register node.
        id: NodeId,
        /// Requested field position.
        index: usize,
    },
    /// Index vector length differs from the node's dimension count.
    #[error("node {id} expects {expected} indices, got {actual}")]
    IndexArity {
        /// Array node.
        id: NodeId,
        /// Number of dimensions.
        expected: usize,
        /// Supplied vector length.
        actual: usize,
    },
    /// An array index lies outside its dimension.
    #[error("index {index} out of range for dimension {dim} (extent {extent}) of node {id}")]
    IndexOutOfRange {
        /// Array node.
        id: NodeId,
        /// Dimension position.
        dim: usize,
        /// Supplied index.
        index: u64,
        /// Dimension extent.
        extent: u64,
    },
    /// Index stack length differs from the node's depth.
    #[error("index stack for node {id} needs {expected} entries, got {actual}")]
    StackDepth {
        /// Target node.
        id: NodeId,
        /// Nodes on the path from the root.
        expected: usize,
        /// Supplied stack length.
        actual: usize,
    },
    /// Address lookup descended more levels than allowed; the map is cyclic
    /// or otherwise corrupt.
    #[error("iteration limit of {limit} reached while looking up address {address}")]
    IterationLimit {
        /// Configured level cap.
        limit: usize,
        /// Address being resolved, as `0x…` text.
        address: String,
    },
}

impl RalError {
    /// Errors that indicate a corrupt address map rather than a caller bug.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::IterationLimit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::RalError;

    #[test]
    fn only_iteration_limit_is_fatal() {
        let fatal = RalError::IterationLimit {
            limit: 100,
            address: "0x10".to_string(),
        };
        assert!(fatal.is_fatal());
        assert!(!RalError::UnknownNode { id: 3 }.is_fatal());
        assert!(!RalError::NotARegister { id: 0 }.is_fatal());
    }

    #[test]
    fn messages_name_the_offending_node() {
        let error = RalError::IndexOutOfRange {
            id: 4,
            dim: 1,
            index: 9,
            extent: 8,
        };
        assert_eq!(
            error.to_string(),
            "index 9 out of range for dimension 1 (extent 8) of node 4"
        );
    }
}
