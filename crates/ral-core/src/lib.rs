//! Register abstraction layer address-space model.
//!
//! Builds an immutable tree of blocks, register arrays, registers, and bit
//! fields from a description, then answers address, path, and field-value
//! questions against it. Mutable view state (current array indices, field
//! display modes, active node) lives in a [`Session`].

/// Arbitrary-precision integer text parsing and bit helpers.
pub mod bigint;
pub use bigint::{format_hex, parse_hex, parse_uint, ParseIntError};

/// Session-wide tunables.
pub mod config;
pub use config::{RalConfig, DEFAULT_LOOKUP_ITERATION_LIMIT};

/// Error taxonomy for resolver and session operations.
pub mod error;
pub use error::RalError;

/// Address-map node tree.
pub mod index;
pub use index::{
    AddressMap, ArrayShape, DisplayMode, Field, HexCell, IndexStack, Node, NodeId, NodeKind,
};

/// Description loader.
pub mod load;
pub use load::{load_description, load_json, load_script, LoadError};

/// Current indices, display modes, and active node.
pub mod session;
pub use session::{OpenedPath, Session};

/// Address offsets, absolute addresses, and address lookup.
pub mod resolve;
pub use resolve::{
    absolute_address, absolute_address_with, address_offset, flatten_index, footprint,
    resolve_address, resolve_address_with_limit, unflatten_index, Resolved,
};

/// Textual node paths.
pub mod path;
pub use path::{
    apply_index_stack, decode_path, encode_path, encode_path_plain, parse_path, DecodedPath,
    PathError,
};

/// Raw register value to field text conversion.
pub mod field;
pub use field::{
    compose_register_value, decode_field, decompose_register_value, encode_field, field_value,
    format_field_value, ComposedValue, FieldError, MAX_REAL_EXPONENT,
};

/// Register value editor with per-address persistence.
pub mod tester;
pub use tester::{state_key, MemoryRegStore, RegState, RegStateStore, RegisterTester};

#[cfg(test)]
use proptest as _;
