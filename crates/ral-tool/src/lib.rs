//! Command-line front-end over register abstraction layer descriptions.

use simple_logger as _;
#[cfg(test)]
use tempfile as _;

/// Command implementations returning printable reports.
pub mod commands;
pub use commands::{
    address_of, decode, encode, load_map, lookup, open_path, to_json, tree, FieldLine, Located,
    RegisterReport, TreeRow,
};

/// Error type shared by every command.
pub mod error;
pub use error::ToolError;
