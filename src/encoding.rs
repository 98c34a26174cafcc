//! Outbound command framing.
//!
//! Device firmware revisions disagree on how commands are written. Raw binary
//! is the canonical encoding; ASCII text and the hybrid form (dimensions as
//! digit characters, data as raw bytes) are kept for older firmware.
//!
//! | command          | raw                      | ascii            | hybrid                      |
//! |------------------|--------------------------|------------------|-----------------------------|
//! | LoadMatrix       | `r c v.. \r`             | `"r c v1 v2 .."` | `'0'+r '0'+c v.. \r`        |
//! | Generate         | `r c k`                  | `"r c k"`        | `'0'+r '0'+c k`             |
//! | QueryStatistics  | `00 00`                  | `"0 0"`          | `"00"`                      |
//! | RequestDimension | `r c`                    | `"r c"`          | `'0'+r '0'+c`               |
//! | SelectOperation  | `code`                   | `"code"`         | `'0'+code`                  |
//! | SelectOperand    | `id` byte if it fits     | id digits        | id digits                   |
//! | Confirm / Cancel | `FF` / `FE`              | same             | same                        |

use serde::{Deserialize, Serialize};

use crate::model::{Dimension, OperationKind};

/// Sentinel byte that commits a calculation.
pub const CONFIRM_BYTE: u8 = 0xFF;
/// Sentinel byte that abandons a calculation.
pub const CANCEL_BYTE: u8 = 0xFE;

/// Selects how commands are written to the link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Raw,
    Ascii,
    Hybrid,
}

/// A logical command, independent of its byte encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a matrix entered by the operator.
    LoadMatrix { dims: Dimension, values: Vec<i64> },
    /// Ask the device to generate `count` random matrices.
    Generate { dims: Dimension, count: u8 },
    /// Zero-dimension query: request the statistics table.
    QueryStatistics,
    /// Request every stored matrix with this shape.
    RequestDimension(Dimension),
    SelectOperation(OperationKind),
    /// Pick a stored matrix by its device-assigned identifier.
    SelectOperand(String),
    Confirm,
    Cancel,
}

impl Command {
    pub fn encode(&self, encoding: Encoding) -> Vec<u8> {
        match self {
            Command::Confirm => vec![CONFIRM_BYTE],
            Command::Cancel => vec![CANCEL_BYTE],
            Command::LoadMatrix { dims, values } => match encoding {
                Encoding::Raw => {
                    let mut out = vec![dims.rows, dims.cols];
                    out.extend(values.iter().map(|v| mask(*v)));
                    out.push(b'\r');
                    out
                }
                Encoding::Ascii => {
                    let mut text = format!("{} {}", dims.rows, dims.cols);
                    for v in values {
                        text.push(' ');
                        text.push_str(&v.to_string());
                    }
                    text.into_bytes()
                }
                Encoding::Hybrid => {
                    let mut out = vec![digit(dims.rows), digit(dims.cols)];
                    out.extend(values.iter().map(|v| mask(*v)));
                    out.push(b'\r');
                    out
                }
            },
            Command::Generate { dims, count } => match encoding {
                Encoding::Raw => vec![dims.rows, dims.cols, *count],
                Encoding::Ascii => format!("{} {} {}", dims.rows, dims.cols, count).into_bytes(),
                Encoding::Hybrid => vec![digit(dims.rows), digit(dims.cols), *count],
            },
            Command::QueryStatistics => match encoding {
                Encoding::Raw => vec![0, 0],
                Encoding::Ascii => b"0 0".to_vec(),
                Encoding::Hybrid => b"00".to_vec(),
            },
            Command::RequestDimension(dims) => match encoding {
                Encoding::Raw => vec![dims.rows, dims.cols],
                Encoding::Ascii => format!("{} {}", dims.rows, dims.cols).into_bytes(),
                Encoding::Hybrid => vec![digit(dims.rows), digit(dims.cols)],
            },
            Command::SelectOperation(op) => match encoding {
                Encoding::Raw => vec![op.code()],
                Encoding::Ascii => op.code().to_string().into_bytes(),
                Encoding::Hybrid => vec![digit(op.code())],
            },
            Command::SelectOperand(id) => {
                let token = operand_token(id);
                match (encoding, token.parse::<u8>()) {
                    (Encoding::Raw, Ok(byte)) => vec![byte],
                    _ => token.as_bytes().to_vec(),
                }
            }
        }
    }
}

/// The part of an identifier line that names the matrix on the device.
///
/// Identifier lines are free text (`ID: 3`, `#3`, `3`); the last number in
/// the line is the identifier. Lines without a number are used verbatim.
pub fn operand_token(id: &str) -> &str {
    let id = id.trim();
    let bytes = id.as_bytes();
    let Some(end) = bytes.iter().rposition(u8::is_ascii_digit) else {
        return id;
    };
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |p| p + 1);
    &id[start..=end]
}

// Values travel as their low 8 bits.
fn mask(value: i64) -> u8 {
    (value & 0xFF) as u8
}

fn digit(value: u8) -> u8 {
    b'0'.wrapping_add(value)
}

/// Hex dump used when logging outbound traffic.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
