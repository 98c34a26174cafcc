//! Manual matrix entry.
//!
//! The operator sends a matrix; the device stores it and answers with the
//! assigned identifier followed by the stored rows.

use tracing::debug;

use super::{unsupported, Action, Event, ModeController, ModeKey, Outbox};
use crate::block::MatrixBlockParser;
use crate::config::Limits;
use crate::encoding::Command;
use crate::error::ValidationError;

#[derive(Debug)]
enum Phase {
    Ready,
    AwaitingReply(MatrixBlockParser),
}

#[derive(Debug)]
pub struct InputController {
    limits: Limits,
    phase: Phase,
}

impl InputController {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            phase: Phase::Ready,
        }
    }

    pub fn is_awaiting_reply(&self) -> bool {
        matches!(self.phase, Phase::AwaitingReply(_))
    }
}

impl ModeController for InputController {
    fn mode(&self) -> ModeKey {
        ModeKey::Input
    }

    fn handle_line(&mut self, line: &str, out: &mut Outbox) {
        let Phase::AwaitingReply(parser) = &mut self.phase else {
            debug!(line, "input mode not expecting data, ignoring");
            return;
        };

        let was_awaiting_id = parser.awaiting_id();
        match parser.feed(line) {
            Some(matrix) => {
                out.emit(Event::MatrixReady(matrix));
                self.phase = Phase::Ready;
            }
            None if was_awaiting_id => {
                let id = parser.current_id().unwrap_or_default().to_string();
                out.emit(Event::MatrixIdentified(id));
            }
            None => {}
        }
    }

    fn apply(&mut self, action: &Action, out: &mut Outbox) -> Result<(), ValidationError> {
        match action {
            Action::LoadMatrix { dims, values } => {
                self.limits.check_dims(*dims)?;
                self.limits.check_values(*dims, values)?;
                out.send(Command::LoadMatrix {
                    dims: *dims,
                    values: values.clone(),
                });
                // A new submission supersedes any reply still in flight.
                self.phase = Phase::AwaitingReply(MatrixBlockParser::new(*dims, true));
                Ok(())
            }
            other => Err(unsupported(other, self.mode())),
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Ready;
    }

    fn phase_name(&self) -> &'static str {
        match self.phase {
            Phase::Ready => "ready",
            Phase::AwaitingReply(_) => "awaiting reply",
        }
    }
}
