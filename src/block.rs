//! Positional matrix block parser.
//!
//! A block is an optional identifier line followed by exactly `rows` data
//! lines. Nothing marks the end of a block: the parser only counts lines, so a
//! dropped line shifts every block that follows.

use crate::model::{Dimension, Matrix};

#[derive(Debug, Clone)]
pub struct MatrixBlockParser {
    dims: Dimension,
    with_id: bool,
    id: Option<String>,
    rows: Vec<String>,
}

impl MatrixBlockParser {
    /// `with_id` selects whether each block starts with an identifier line.
    pub fn new(dims: Dimension, with_id: bool) -> Self {
        Self {
            dims,
            with_id,
            id: None,
            rows: Vec::with_capacity(dims.rows as usize),
        }
    }

    pub fn dims(&self) -> Dimension {
        self.dims
    }

    /// True when the next line will be taken as a block identifier.
    pub fn awaiting_id(&self) -> bool {
        self.with_id && self.id.is_none()
    }

    /// True between blocks.
    pub fn is_idle(&self) -> bool {
        self.rows.is_empty() && self.id.is_none()
    }

    /// Identifier of the block being collected, if already seen.
    pub fn current_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Data rows collected so far for the current block.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Consumes one line; returns the matrix when it completes a block.
    pub fn feed(&mut self, line: &str) -> Option<Matrix> {
        if self.awaiting_id() {
            self.id = Some(line.trim().to_string());
            return None;
        }

        self.rows.push(line.to_string());
        if self.rows.len() < self.dims.rows as usize {
            return None;
        }

        let rows = std::mem::replace(&mut self.rows, Vec::with_capacity(self.dims.rows as usize));
        Some(Matrix::from_rows(self.id.take(), self.dims, rows))
    }

    pub fn reset(&mut self) {
        self.id = None;
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_with_identifier() {
        let mut parser = MatrixBlockParser::new(Dimension::new(2, 2).unwrap(), true);
        assert!(parser.awaiting_id());
        assert!(parser.feed("ID: 3").is_none());
        assert_eq!(parser.current_id(), Some("ID: 3"));
        assert!(parser.feed("1 2").is_none());
        let m = parser.feed("3 4").unwrap();
        assert_eq!(m.id(), Some("ID: 3"));
        assert_eq!(m.rows(), &["1 2".to_string(), "3 4".to_string()]);
        assert!(parser.is_idle());
    }

    #[test]
    fn consecutive_blocks_without_identifier() {
        let mut parser = MatrixBlockParser::new(Dimension::new(1, 3).unwrap(), false);
        let a = parser.feed("1 2 3").unwrap();
        let b = parser.feed("4 5 6").unwrap();
        assert_eq!(a.id(), None);
        assert_eq!(a.values(), &[1, 2, 3]);
        assert_eq!(b.values(), &[4, 5, 6]);
    }

    #[test]
    fn dropped_line_shifts_following_blocks() {
        let mut parser = MatrixBlockParser::new(Dimension::new(2, 1).unwrap(), true);
        // The id line of the first block was lost in transit.
        assert!(parser.feed("1").is_none());
        assert!(parser.feed("2").is_none());
        let m = parser.feed("B").unwrap();
        assert_eq!(m.id(), Some("1"));
        assert_eq!(m.rows(), &["2".to_string(), "B".to_string()]);
    }

    #[test]
    fn reset_discards_partial_block() {
        let mut parser = MatrixBlockParser::new(Dimension::new(2, 2).unwrap(), true);
        parser.feed("A");
        parser.feed("1 1");
        parser.reset();
        assert!(parser.is_idle());
        assert!(parser.awaiting_id());
    }
}
