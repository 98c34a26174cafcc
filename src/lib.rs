//! # FPGA Matrix Client Library
//!
//! This library decodes the serial protocol of an FPGA matrix unit and drives
//! its operating modes: manual matrix entry, random generation, matrix-bank
//! browsing and multi-operand calculation.
//!
//! Data flows in one direction:
//!
//! ```text
//! ByteChannel ─▶ LineFramer ─▶ ModeRouter ─▶ active ModeController
//!     ▲                                          │
//!     └────────────── Command bytes ◀────────────┘
//! ```
//!
//! [`ByteChannel`] reads on a background thread and hands chunks to a
//! consumer; a [`Session`] on the consumer side frames lines, routes them and
//! transmits whatever the controllers ask for. Everything past the channel is
//! plain, synchronous state and can be driven from tests with byte slices.

pub mod block;
pub mod channel;
pub mod config;
pub mod console;
pub mod encoding;
pub mod error;
pub mod framer;
pub mod logging;
pub mod model;
pub mod modes;
pub mod router;
pub mod session;
pub mod table;

pub use channel::{ByteChannel, CommandSink, ConnectionState, Endpoint, LinkEvent};
pub use config::Config;
pub use encoding::{Command, Encoding};
pub use error::{ConfigError, Error, LinkError, Result, ValidationError};
pub use framer::LineFramer;
pub use model::{Dimension, Matrix, Operand, OperationKind, StatisticsEntry};
pub use modes::{Action, Event, ModeController, ModeKey};
pub use router::ModeRouter;
pub use session::Session;
