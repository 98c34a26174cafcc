//! Random matrix generation: `count` blocks of `rows` lines, no identifiers.

use tracing::debug;

use super::{unsupported, Action, Event, ModeController, ModeKey, Outbox};
use crate::block::MatrixBlockParser;
use crate::config::Limits;
use crate::encoding::Command;
use crate::error::ValidationError;

#[derive(Debug)]
struct Batch {
    parser: MatrixBlockParser,
    remaining: u32,
    received: usize,
}

#[derive(Debug)]
pub struct GenerateController {
    limits: Limits,
    batch: Option<Batch>,
}

impl GenerateController {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            batch: None,
        }
    }

    /// Matrices still expected from the current request.
    pub fn remaining(&self) -> u32 {
        self.batch.as_ref().map_or(0, |b| b.remaining)
    }
}

impl ModeController for GenerateController {
    fn mode(&self) -> ModeKey {
        ModeKey::Generate
    }

    fn handle_line(&mut self, line: &str, out: &mut Outbox) {
        let Some(batch) = self.batch.as_mut() else {
            debug!(line, "generate mode not expecting data, ignoring");
            return;
        };

        if let Some(matrix) = batch.parser.feed(line) {
            out.emit(Event::MatrixReady(matrix));
            batch.received += 1;
            batch.remaining -= 1;
            if batch.remaining == 0 {
                out.emit(Event::BatchComplete {
                    received: batch.received,
                });
                self.batch = None;
            }
        }
    }

    fn apply(&mut self, action: &Action, out: &mut Outbox) -> Result<(), ValidationError> {
        match action {
            Action::Generate { dims, count } => {
                self.limits.check_dims(*dims)?;
                self.limits.check_count(*count)?;
                let count_byte = u8::try_from(*count).map_err(|_| {
                    ValidationError::CountOutOfRange {
                        count: *count,
                        max: u8::MAX as u32,
                    }
                })?;
                out.send(Command::Generate {
                    dims: *dims,
                    count: count_byte,
                });
                self.batch = Some(Batch {
                    parser: MatrixBlockParser::new(*dims, false),
                    remaining: *count,
                    received: 0,
                });
                Ok(())
            }
            other => Err(unsupported(other, self.mode())),
        }
    }

    fn reset(&mut self) {
        self.batch = None;
    }

    fn phase_name(&self) -> &'static str {
        if self.batch.is_some() {
            "receiving"
        } else {
            "ready"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dimension;

    fn generate(rows: u8, cols: u8, count: u32) -> Action {
        Action::Generate {
            dims: Dimension::new(rows, cols).unwrap(),
            count,
        }
    }

    #[test]
    fn collects_count_blocks_then_completes() {
        let mut ctl = GenerateController::new(Limits::default());
        let mut out = Outbox::new();
        ctl.apply(&generate(2, 2, 2), &mut out).unwrap();
        assert_eq!(
            out.take_commands(),
            vec![Command::Generate {
                dims: Dimension::new(2, 2).unwrap(),
                count: 2
            }]
        );

        for line in ["1 2", "3 4", "5 6"] {
            ctl.handle_line(line, &mut out);
        }
        assert_eq!(ctl.remaining(), 1);
        ctl.handle_line("7 8", &mut out);

        let events = out.take_events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Event::MatrixReady(m) if m.id().is_none()));
        assert!(matches!(&events[1], Event::MatrixReady(m) if m.values() == [5, 6, 7, 8]));
        assert_eq!(events[2], Event::BatchComplete { received: 2 });
        assert_eq!(ctl.phase_name(), "ready");
    }

    #[test]
    fn rejects_oversized_dimensions() {
        let mut ctl = GenerateController::new(Limits {
            max_dim: 5,
            ..Limits::default()
        });
        let mut out = Outbox::new();
        assert!(matches!(
            ctl.apply(&generate(6, 2, 1), &mut out),
            Err(ValidationError::DimensionOutOfRange { .. })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn reset_abandons_batch() {
        let mut ctl = GenerateController::new(Limits::default());
        let mut out = Outbox::new();
        ctl.apply(&generate(1, 1, 3), &mut out).unwrap();
        ctl.handle_line("4", &mut out);
        ctl.reset();
        out.take_events();
        ctl.handle_line("5", &mut out);
        assert!(out.is_empty());
        assert_eq!(ctl.remaining(), 0);
    }
}
