//! Matrix bank browsing.
//!
//! Entering the mode requests the statistics table. Picking one of its rows
//! fetches every stored matrix of that shape, each as an identifier line plus
//! its rows.

use tracing::debug;

use super::{unsupported, Action, Event, ModeController, ModeKey, Outbox};
use crate::block::MatrixBlockParser;
use crate::encoding::Command;
use crate::error::ValidationError;
use crate::model::StatisticsEntry;
use crate::table::{TableParser, TableStep};

#[derive(Debug)]
struct Fetch {
    parser: MatrixBlockParser,
    remaining: u32,
    received: usize,
}

#[derive(Debug, Default)]
pub struct DisplayController {
    table: TableParser,
    fetch: Option<Fetch>,
}

impl DisplayController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of the most recent statistics table.
    pub fn statistics(&self) -> &[StatisticsEntry] {
        self.table.entries()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch.is_some()
    }

    fn request_statistics(&mut self, out: &mut Outbox) {
        self.table.reset();
        self.fetch = None;
        out.send(Command::QueryStatistics);
    }

    fn handle_block_line(&mut self, line: &str, out: &mut Outbox) {
        let Some(fetch) = self.fetch.as_mut() else {
            debug!(line, "display mode not expecting matrices, ignoring");
            return;
        };

        let was_awaiting_id = fetch.parser.awaiting_id();
        match fetch.parser.feed(line) {
            Some(matrix) => {
                out.emit(Event::MatrixReady(matrix));
                fetch.received += 1;
                fetch.remaining = fetch.remaining.saturating_sub(1);
                if fetch.remaining == 0 {
                    out.emit(Event::BatchComplete {
                        received: fetch.received,
                    });
                    self.fetch = None;
                }
            }
            None if was_awaiting_id => {
                let id = fetch.parser.current_id().unwrap_or_default().to_string();
                out.emit(Event::MatrixIdentified(id));
            }
            None => {}
        }
    }
}

impl ModeController for DisplayController {
    fn mode(&self) -> ModeKey {
        ModeKey::Display
    }

    fn handle_line(&mut self, line: &str, out: &mut Outbox) {
        match self.table.feed(line) {
            TableStep::Consumed => {}
            TableStep::Entry(entry) => out.emit(Event::StatisticsEntry(entry)),
            TableStep::Closed(last) => {
                if let Some(entry) = last {
                    out.emit(Event::StatisticsEntry(entry));
                }
                out.emit(Event::StatisticsReady(self.table.entries().to_vec()));
            }
            TableStep::Terminated => {
                out.emit(Event::StatisticsReady(self.table.entries().to_vec()));
                self.handle_block_line(line, out);
            }
            TableStep::Unrelated => self.handle_block_line(line, out),
        }
    }

    fn apply(&mut self, action: &Action, out: &mut Outbox) -> Result<(), ValidationError> {
        match action {
            Action::RefreshStatistics => {
                self.request_statistics(out);
                Ok(())
            }
            Action::SelectDimension(dims) => {
                let entry = self
                    .table
                    .entries()
                    .iter()
                    .find(|e| e.dims == *dims)
                    .copied()
                    .ok_or(ValidationError::NotOffered(*dims))?;

                if self.table.is_open() {
                    self.table.close();
                    out.emit(Event::StatisticsReady(self.table.entries().to_vec()));
                }
                out.send(Command::RequestDimension(*dims));
                if entry.count == 0 {
                    out.emit(Event::BatchComplete { received: 0 });
                    self.fetch = None;
                } else {
                    self.fetch = Some(Fetch {
                        parser: MatrixBlockParser::new(*dims, true),
                        remaining: entry.count,
                        received: 0,
                    });
                }
                Ok(())
            }
            other => Err(unsupported(other, self.mode())),
        }
    }

    fn reset(&mut self) {
        self.table.reset();
        self.fetch = None;
    }

    fn activate(&mut self, out: &mut Outbox) {
        self.request_statistics(out);
    }

    fn phase_name(&self) -> &'static str {
        if self.fetch.is_some() {
            "fetching matrices"
        } else if self.table.is_open() {
            "reading statistics"
        } else {
            "browsing"
        }
    }
}
