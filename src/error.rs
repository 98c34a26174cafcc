//! Error types, one enum per failure class.
//!
//! Framing overflow and protocol desynchronisation are recovered locally
//! (logged and skipped) and therefore have no error type here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::{Dimension, OperationKind};

/// Transport failures reported by the byte channel.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A write was attempted while no connection is open.
    #[error("not connected")]
    NotConnected,
    /// The endpoint string could not be interpreted.
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
    /// Opening the serial device or socket failed.
    #[error("failed to open '{endpoint}': {source}")]
    Open {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// Writing to an open connection failed; the channel has been closed.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// Operator input rejected before anything is sent to the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Rows or columns outside `1..=max`.
    #[error("dimension {rows}x{cols} outside 1..={max}")]
    DimensionOutOfRange { rows: u8, cols: u8, max: u8 },
    /// An element value outside the configured range.
    #[error("value {value} at index {index} outside {min}..={max}")]
    ValueOutOfRange {
        index: usize,
        value: i64,
        min: i64,
        max: i64,
    },
    /// Element count does not match the dimension.
    #[error("expected {expected} values, got {actual}")]
    WrongValueCount { expected: usize, actual: usize },
    /// Generate count outside `1..=max`.
    #[error("count {count} outside 1..={max}")]
    CountOutOfRange { count: u32, max: u32 },
    /// The dimension was not listed in the current statistics table.
    #[error("dimension {0} is not offered by the device")]
    NotOffered(Dimension),
    /// The dimension cannot be the second operand of this operation.
    #[error("{op} cannot take a {second} operand after {first}")]
    IncompatibleOperand {
        op: OperationKind,
        first: Dimension,
        second: Dimension,
    },
    /// No received matrix carries this identifier.
    #[error("no matrix with id '{0}' has been received")]
    UnknownMatrix(String),
    /// The action is meaningful for this mode, but not in its current phase.
    #[error("'{action}' is not valid while {phase}")]
    WrongPhase {
        action: &'static str,
        phase: &'static str,
    },
    /// The active mode does not handle this action at all.
    #[error("'{action}' is not supported in {mode} mode")]
    Unsupported {
        action: &'static str,
        mode: &'static str,
    },
    /// No mode controller is active (idle).
    #[error("no mode is active")]
    NoActiveMode,
}

/// Configuration file problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Umbrella error for the session and the command-line front end.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
