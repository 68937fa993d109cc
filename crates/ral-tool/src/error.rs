use std::path::PathBuf;

use ral_core::{LoadError, ParseIntError, PathError, RalError};
use thiserror::Error;

/// Failures reported by `ral-tool` commands.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Description file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was opened.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// Description text was rejected.
    #[error("invalid description: {0}")]
    Load(#[from] LoadError),
    /// Address-map operation failed.
    #[error(transparent)]
    Ral(#[from] RalError),
    /// Node path did not decode.
    #[error("invalid path {text:?}: {source}")]
    Path {
        /// Path as given.
        text: String,
        /// Reason for rejection.
        source: PathError,
    },
    /// Numeric argument did not parse.
    #[error("invalid number {text:?}: {source}")]
    Number {
        /// Argument as given.
        text: String,
        /// Reason for rejection.
        source: ParseIntError,
    },
    /// Command needs a register but the path names a block.
    #[error("{path} is not a register")]
    NotARegister {
        /// Canonical path of the node.
        path: String,
    },
    /// Field assignment is not of the form `name=text`.
    #[error("expected <field>=<value>, got {text:?}")]
    Assignment {
        /// Argument as given.
        text: String,
    },
    /// Register has no field of that name.
    #[error("{register} has no field named {name:?}")]
    UnknownField {
        /// Canonical register path.
        register: String,
        /// Field name searched for.
        name: String,
    },
    /// `--root` named no root of the map.
    #[error("no root named {name:?}")]
    UnknownRoot {
        /// Name searched for.
        name: String,
    },
    /// No root contains the address.
    #[error("address {address} is not mapped")]
    Unmapped {
        /// Address as `0x…` text.
        address: String,
    },
    /// JSON output could not be produced.
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}
