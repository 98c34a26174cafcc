//! Mode controllers.
//!
//! Each controller owns one state machine and interprets inbound lines in the
//! light of the commands it issued earlier. Controllers never touch the link:
//! they queue logical [`Command`]s and UI-facing [`Event`]s in an [`Outbox`],
//! which the session drains after every line or action.

use std::fmt;

use crate::encoding::Command;
use crate::error::ValidationError;
use crate::model::{Dimension, Matrix, Operand, OperationKind, StatisticsEntry};

pub mod calc;
pub mod display;
pub mod generate;
pub mod input;

pub use calc::{CalcController, CalcPhase, CalcResult};
pub use display::DisplayController;
pub use generate::GenerateController;
pub use input::InputController;

/// Device-selected operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKey {
    Idle,
    Input,
    Generate,
    Display,
    Calc,
}

impl ModeKey {
    pub const ALL: [ModeKey; 5] = [
        ModeKey::Idle,
        ModeKey::Input,
        ModeKey::Generate,
        ModeKey::Display,
        ModeKey::Calc,
    ];

    /// Three-letter key used on the wire.
    pub fn key(self) -> &'static str {
        match self {
            ModeKey::Idle => "ide",
            ModeKey::Input => "inp",
            ModeKey::Generate => "gen",
            ModeKey::Display => "dis",
            ModeKey::Calc => "cal",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.key() == key)
    }
}

impl fmt::Display for ModeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ModeChanged(ModeKey),
    /// Already filtered for the calc operand.
    StatisticsEntry(StatisticsEntry),
    StatisticsReady(Vec<StatisticsEntry>),
    MatrixIdentified(String),
    MatrixReady(Matrix),
    BatchComplete { received: usize },
    // Rows of an operand echo received so far.
    EchoProgress { operand: Operand, rows: Vec<String> },
    EchoVerified(Operand),
    AwaitingConfirmation,
    ResultReady(CalcResult),
    Cancelled,
    Transmitted(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    LoadMatrix { dims: Dimension, values: Vec<i64> },
    Generate { dims: Dimension, count: u32 },
    RefreshStatistics,
    SelectOperation(OperationKind),
    SelectDimension(Dimension),
    SelectMatrix(String),
    Confirm,
    Cancel,
    Reset,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::LoadMatrix { .. } => "load",
            Action::Generate { .. } => "generate",
            Action::RefreshStatistics => "refresh",
            Action::SelectOperation(_) => "select operation",
            Action::SelectDimension(_) => "select dimension",
            Action::SelectMatrix(_) => "select matrix",
            Action::Confirm => "confirm",
            Action::Cancel => "cancel",
            Action::Reset => "reset",
        }
    }
}

// Commands and events produced while handling one line or action.
#[derive(Debug, Default)]
pub struct Outbox {
    commands: Vec<Command>,
    events: Vec<Event>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.events.is_empty()
    }
}

/// Common contract of the per-mode state machines.
pub trait ModeController {
    fn mode(&self) -> ModeKey;

    /// Interprets one inbound line. Lines that do not fit the current
    /// phase are skipped.
    fn handle_line(&mut self, line: &str, out: &mut Outbox);

    /// Applies an operator action. Rejected actions leave the state untouched
    /// and queue nothing.
    fn apply(&mut self, action: &Action, out: &mut Outbox) -> Result<(), ValidationError>;

    fn reset(&mut self);

    /// Entry side effects, run after `reset` when the mode becomes active.
    fn activate(&mut self, _out: &mut Outbox) {}

    fn phase_name(&self) -> &'static str;
}

pub(crate) fn unsupported(action: &Action, mode: ModeKey) -> ValidationError {
    ValidationError::Unsupported {
        action: action.name(),
        mode: mode.key(),
    }
}

pub(crate) fn wrong_phase(action: &Action, phase: &'static str) -> ValidationError {
    ValidationError::WrongPhase {
        action: action.name(),
        phase,
    }
}
