//! Data model shared by the parsers and the mode controllers.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

// Convolution kernel shape, never offered for selection.
pub const CONVOLUTION_KERNEL: Dimension = Dimension { rows: 3, cols: 3 };

/// Row count of a convolution result (fixed output feature size of the device).
pub const CONVOLUTION_RESULT_ROWS: usize = 8;

/// Matrix shape as reported by the device. Both sides are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub rows: u8,
    pub cols: u8,
}

impl Dimension {
    /// Returns `None` when either side is zero.
    pub fn new(rows: u8, cols: u8) -> Option<Self> {
        if rows == 0 || cols == 0 {
            return None;
        }
        Some(Self { rows, cols })
    }

    pub fn len(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsEntry {
    pub dims: Dimension,
    pub count: u32,
}

/// A complete matrix block received from the device.
///
/// Row text is kept verbatim for display; `values` holds the signed integers
/// found in those rows, in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    id: Option<String>,
    dims: Dimension,
    rows: Vec<String>,
    values: Vec<i64>,
}

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d+").expect("static regex"))
}

/// Extracts every signed integer from a line of row text.
pub fn parse_values(line: &str) -> impl Iterator<Item = i64> + '_ {
    integer_pattern()
        .find_iter(line)
        .filter_map(|m| m.as_str().parse().ok())
}

impl Matrix {
    pub fn from_rows(id: Option<String>, dims: Dimension, rows: Vec<String>) -> Self {
        let values = rows.iter().flat_map(|row| parse_values(row)).collect();
        Self {
            id,
            dims,
            rows,
            values,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn dims(&self) -> Dimension {
        self.dims
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// True when the row text yielded exactly `rows * cols` integers.
    pub fn is_well_formed(&self) -> bool {
        self.values.len() == self.dims.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Add,
    MatrixMul,
    ScalarMul,
    Transpose,
    Convolution,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Add,
        OperationKind::MatrixMul,
        OperationKind::ScalarMul,
        OperationKind::Transpose,
        OperationKind::Convolution,
    ];

    /// Selector code transmitted when the operation is chosen.
    pub fn code(self) -> u8 {
        match self {
            OperationKind::Add => 0,
            OperationKind::MatrixMul => 1,
            OperationKind::ScalarMul => 2,
            OperationKind::Transpose => 3,
            OperationKind::Convolution => 4,
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(self, OperationKind::Add | OperationKind::MatrixMul)
    }

    pub fn operand_count(self) -> usize {
        if self.is_binary() {
            2
        } else {
            1
        }
    }

    /// Whether a matrix of shape `b` may be the second operand when `a` is the first.
    pub fn accepts_second(self, a: Dimension, b: Dimension) -> bool {
        match self {
            OperationKind::Add => a == b,
            OperationKind::MatrixMul => b.rows == a.cols,
            OperationKind::ScalarMul | OperationKind::Transpose | OperationKind::Convolution => {
                false
            }
        }
    }

    /// Number of result lines the device sends for first operand `a`.
    pub fn result_rows(self, a: Dimension) -> usize {
        match self {
            OperationKind::Transpose => a.cols as usize,
            OperationKind::Add | OperationKind::MatrixMul | OperationKind::ScalarMul => {
                a.rows as usize
            }
            OperationKind::Convolution => CONVOLUTION_RESULT_ROWS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::MatrixMul => "mul",
            OperationKind::ScalarMul => "scalar",
            OperationKind::Transpose => "transpose",
            OperationKind::Convolution => "conv",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    A,
    B,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::A => f.write_str("A"),
            Operand::B => f.write_str("B"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(rows: u8, cols: u8) -> Dimension {
        Dimension::new(rows, cols).unwrap()
    }

    #[test]
    fn zero_sided_dimension_is_rejected() {
        assert!(Dimension::new(0, 3).is_none());
        assert!(Dimension::new(3, 0).is_none());
        assert_eq!(dims(2, 3).len(), 6);
    }

    #[test]
    fn matrix_values_follow_row_major_order() {
        let m = Matrix::from_rows(
            Some("7".into()),
            dims(2, 2),
            vec!["  1  -2".into(), "[3, 4]".into()],
        );
        assert_eq!(m.values(), &[1, -2, 3, 4]);
        assert!(m.is_well_formed());
        assert_eq!(m.id(), Some("7"));
    }

    #[test]
    fn second_operand_filter_depends_on_operation() {
        let a = dims(2, 3);
        assert!(OperationKind::Add.accepts_second(a, dims(2, 3)));
        assert!(!OperationKind::Add.accepts_second(a, dims(3, 2)));
        assert!(OperationKind::MatrixMul.accepts_second(a, dims(3, 4)));
        assert!(!OperationKind::MatrixMul.accepts_second(a, dims(2, 2)));
        assert!(!OperationKind::Transpose.accepts_second(a, a));
    }

    #[test]
    fn result_rows_per_operation() {
        let a = dims(2, 5);
        assert_eq!(OperationKind::Transpose.result_rows(a), 5);
        assert_eq!(OperationKind::MatrixMul.result_rows(a), 2);
        assert_eq!(OperationKind::Add.result_rows(a), 2);
        assert_eq!(OperationKind::ScalarMul.result_rows(a), 2);
        assert_eq!(OperationKind::Convolution.result_rows(a), 8);
    }

    #[test]
    fn operation_names_round_trip() {
        for op in OperationKind::ALL {
            assert_eq!(OperationKind::from_name(op.name()), Some(op));
        }
        assert_eq!(OperationKind::from_name("div"), None);
    }
}
