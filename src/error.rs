//! The error Kinds of the generator, collected into a single enum.
//!
//! Every variant here corresponds to one row of the Kinds table in the
//! specification's error handling design. `UnsupportedDieTag` is
//! deliberately absent: per the propagation policy it is always recovered
//! locally (a `tracing::warn!` once per distinct tag) and never reaches a
//! caller as an `Err`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("'{0}' does not contain DWARF debug info")]
    NoDebugInfo(PathBuf),

    #[error("malformed debug info: {0}")]
    MalformedDebugInfo(String),

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("value 0x{value:x} does not fit in {bits}-bit field '{field}'")]
    Overflow {
        field: String,
        bits: u32,
        value: u128,
    },

    #[error("invalid field name '{0}': member names may not begin with '_'")]
    InvalidField(String),

    #[error("invalid overlay '{0}': {1}")]
    InvalidOverlay(String, String),

    #[error("failed to compile constraint `{expr}`: {reason}")]
    ConstraintCompileError { expr: String, reason: String },

    #[error("no solution found for command index {0}")]
    ConstraintUnsat(usize),

    #[error("missing required config key '{0}'")]
    MissingConfigKey(String),

    #[error("custom data file '{0}' does not exist")]
    CustomDataFileMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse ELF/object file: {0}")]
    ObjectParse(String),
}

pub type Result<T> = std::result::Result<T, GenError>;
