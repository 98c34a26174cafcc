//! Bordered statistics table parser.
//!
//! ```text
//! +----+----+-------+
//! | M  | N  | Count |
//! +----+----+-------+
//! | 2  | 2  | 3     |
//! | 3  | 4  | 1     |
//! +----+----+-------+
//! ```
//!
//! Two termination rules apply. When a total has been declared (a `Total: N`
//! line, or [`TableParser::expect_total`]) the table closes as soon as the
//! accumulated counts reach it, and the border that follows is swallowed.
//! Without a total, the first line after the data rows that is neither a
//! border, a data row, nor a header closes the table; that line is handed
//! back to the caller.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use crate::model::{Dimension, StatisticsEntry};

fn row_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\|\s*(\d+)\s*\|\s*(\d+)\s*\|\s*(\d+)\s*\|").expect("static regex")
    })
}

fn total_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\btotal\b\D*(\d+)").expect("static regex"))
}

/// `+----+`-style border line.
pub fn is_border(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('+') && line.contains("--")
}

/// Parses a `| m | n | count |` data row.
pub fn parse_row(line: &str) -> Option<StatisticsEntry> {
    let caps = row_pattern().captures(line)?;
    let rows = caps[1].parse().ok()?;
    let cols = caps[2].parse().ok()?;
    let count = caps[3].parse().ok()?;
    Some(StatisticsEntry {
        dims: Dimension::new(rows, cols)?,
        count,
    })
}

/// Parses a line declaring the table's total matrix count.
pub fn parse_total(line: &str) -> Option<u32> {
    total_pattern().captures(line)?[1].parse().ok()
}

/// Any line that belongs to a table's framing or body.
pub fn is_table_line(line: &str) -> bool {
    is_border(line) || row_pattern().is_match(line)
}

/// What a fed line meant to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStep {
    /// Not part of any table; the caller should handle the line.
    Unrelated,
    /// Part of the table (border, header, total, noise); nothing new.
    Consumed,
    /// A data row.
    Entry(StatisticsEntry),
    /// The declared total was reached; the line was consumed.
    Closed(Option<StatisticsEntry>),
    /// The line ended the table without belonging to it; handle it as unrelated.
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Open { data_started: bool },
    Closed { swallow_border: bool },
}

#[derive(Debug, Clone)]
pub struct TableParser {
    phase: Phase,
    entries: Vec<StatisticsEntry>,
    expected_total: Option<u32>,
    accumulated: u32,
}

impl Default for TableParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TableParser {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            entries: Vec::new(),
            expected_total: None,
            accumulated: 0,
        }
    }

    /// Declares the total count for the next (or current) table.
    pub fn expect_total(&mut self, total: u32) {
        self.expected_total = Some(total);
    }

    pub fn entries(&self) -> &[StatisticsEntry] {
        &self.entries
    }

    pub fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Open { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, Phase::Closed { .. })
    }

    /// Ends an open table early, keeping the entries seen so far.
    pub fn close(&mut self) {
        if self.is_open() {
            self.finish(false);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn feed(&mut self, line: &str) -> TableStep {
        match self.phase {
            Phase::Idle => self.feed_outside(line),
            Phase::Closed { swallow_border } => {
                if swallow_border && is_border(line) {
                    self.phase = Phase::Closed {
                        swallow_border: false,
                    };
                    return TableStep::Consumed;
                }
                self.phase = Phase::Closed {
                    swallow_border: false,
                };
                self.feed_outside(line)
            }
            Phase::Open { data_started } => self.feed_inside(line, data_started),
        }
    }

    fn feed_outside(&mut self, line: &str) -> TableStep {
        if is_border(line) {
            trace!("statistics table opened");
            self.entries.clear();
            self.accumulated = 0;
            self.phase = Phase::Open {
                data_started: false,
            };
            return TableStep::Consumed;
        }
        if let Some(total) = parse_total(line) {
            self.expected_total = Some(total);
            return TableStep::Consumed;
        }
        TableStep::Unrelated
    }

    fn feed_inside(&mut self, line: &str, data_started: bool) -> TableStep {
        if is_border(line) {
            // A declared total of zero: the border under the header ends it.
            if self.total_reached() {
                self.finish(true);
                return TableStep::Closed(None);
            }
            return TableStep::Consumed;
        }

        if let Some(entry) = parse_row(line) {
            self.entries.push(entry);
            self.accumulated = self.accumulated.saturating_add(entry.count);
            self.phase = Phase::Open { data_started: true };
            if self.total_reached() {
                self.finish(true);
                return TableStep::Closed(Some(entry));
            }
            return TableStep::Entry(entry);
        }

        if let Some(total) = parse_total(line) {
            self.expected_total = Some(total);
            if data_started && self.total_reached() {
                self.finish(true);
                return TableStep::Closed(None);
            }
            return TableStep::Consumed;
        }

        let awaiting_total = self.expected_total.is_some() && !self.total_reached();
        if line.contains('|') || awaiting_total {
            // Header row, or noise inside a table with a known total.
            debug!(line, "skipping non-data line inside statistics table");
            return TableStep::Consumed;
        }

        self.finish(false);
        TableStep::Terminated
    }

    fn total_reached(&self) -> bool {
        matches!(self.expected_total, Some(total) if self.accumulated >= total)
    }

    fn finish(&mut self, swallow_border: bool) {
        debug!(
            entries = self.entries.len(),
            total = self.accumulated,
            "statistics table closed"
        );
        self.expected_total = None;
        self.phase = Phase::Closed { swallow_border };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rows: u8, cols: u8, count: u32) -> StatisticsEntry {
        StatisticsEntry {
            dims: Dimension::new(rows, cols).unwrap(),
            count,
        }
    }

    fn feed_all(parser: &mut TableParser, text: &str) -> Vec<TableStep> {
        text.lines().map(|l| parser.feed(l)).collect()
    }

    #[test]
    fn row_pattern_tolerates_whitespace() {
        assert_eq!(parse_row("|2|3|1|"), Some(entry(2, 3, 1)));
        assert_eq!(parse_row("|   4 |  4   | 12 |"), Some(entry(4, 4, 12)));
        assert_eq!(parse_row("| M | N | Count |"), None);
        assert_eq!(parse_row("| 0 | 2 | 1 |"), None);
    }

    #[test]
    fn known_total_closes_table_and_swallows_border() {
        let mut parser = TableParser::new();
        parser.expect_total(3);
        let steps = feed_all(&mut parser, "+----+\n| 2 | 2 | 3 |\n+----+");
        assert_eq!(
            steps,
            vec![
                TableStep::Consumed,
                TableStep::Closed(Some(entry(2, 2, 3))),
                TableStep::Consumed,
            ]
        );
        assert!(parser.is_closed());
        assert_eq!(parser.entries(), &[entry(2, 2, 3)]);
    }

    #[test]
    fn declared_total_ignores_intervening_noise() {
        let mut parser = TableParser::new();
        let text = "Total: 4\n+----+\n| 1 | 1 | 1 |\ngarbage\n| 2 | 2 | 2 |\n??\n| 3 | 3 | 1 |";
        let steps = feed_all(&mut parser, text);
        assert_eq!(steps[3], TableStep::Consumed);
        assert_eq!(steps[5], TableStep::Consumed);
        assert_eq!(steps[6], TableStep::Closed(Some(entry(3, 3, 1))));
        assert_eq!(parser.entries().len(), 3);
    }

    #[test]
    fn total_line_inside_table_is_honoured() {
        let mut parser = TableParser::new();
        let steps = feed_all(&mut parser, "+--+\n| 2 | 2 | 1 |\n| 3 | 3 | 1 |\nTotal: 2");
        assert_eq!(steps[3], TableStep::Closed(None));
    }

    #[test]
    fn sentinel_line_ends_table_without_total() {
        let mut parser = TableParser::new();
        let text = "+----+\n| M | N | Count |\n+----+\n| 2 | 2 | 1 |\n+----+\nID: 5";
        let steps = feed_all(&mut parser, text);
        assert_eq!(steps[1], TableStep::Consumed);
        assert_eq!(steps[3], TableStep::Entry(entry(2, 2, 1)));
        assert_eq!(steps[4], TableStep::Consumed);
        assert_eq!(steps[5], TableStep::Terminated);
        assert!(parser.is_closed());
        // After closing, ordinary lines are unrelated.
        assert_eq!(parser.feed("1 2"), TableStep::Unrelated);
    }

    #[test]
    fn new_border_after_close_starts_fresh_table() {
        let mut parser = TableParser::new();
        feed_all(&mut parser, "+--+\n| 2 | 2 | 1 |\nend");
        assert!(parser.is_closed());
        assert_eq!(parser.feed("+--+"), TableStep::Consumed);
        assert!(parser.is_open());
        assert!(parser.entries().is_empty());
    }

    #[test]
    fn declared_empty_table_closes_under_header() {
        let mut parser = TableParser::new();
        let text = "Total: 0\n+----+\n| M | N | Count |\n+----+\n+----+\nNo matrices stored";
        let steps = feed_all(&mut parser, text);
        assert_eq!(
            steps,
            vec![
                TableStep::Consumed,
                TableStep::Consumed,
                TableStep::Consumed,
                TableStep::Closed(None),
                TableStep::Consumed,
                TableStep::Unrelated,
            ]
        );
        assert!(parser.entries().is_empty());
    }

    #[test]
    fn empty_table_without_total_ends_at_first_plain_line() {
        let mut parser = TableParser::new();
        let text = "+----+\n| M | N | Count |\n+----+\n+----+\nNo matrices stored\nanything";
        let steps = feed_all(&mut parser, text);
        assert_eq!(steps[4], TableStep::Terminated);
        assert_eq!(steps[5], TableStep::Unrelated);
        assert!(parser.is_closed());
        assert!(parser.entries().is_empty());
    }

    #[test]
    fn unrelated_lines_outside_table() {
        let mut parser = TableParser::new();
        assert_eq!(parser.feed("hello"), TableStep::Unrelated);
        assert!(!parser.is_open());
    }

    #[test]
    fn explicit_close_keeps_entries() {
        let mut parser = TableParser::new();
        feed_all(&mut parser, "+--+\n| 5 | 5 | 2 |");
        parser.close();
        assert!(parser.is_closed());
        assert_eq!(parser.entries(), &[entry(5, 5, 2)]);
    }
}
