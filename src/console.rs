//! Operator command grammar.
//!
//! One command per line, whitespace separated. Dimensions are written
//! `RxC` (`2x3`).

use thiserror::Error;

use crate::model::{Dimension, OperationKind};
use crate::modes::{Action, ModeKey};

pub const HELP: &str = "\
commands:
  mode <ide|inp|gen|dis|cal>   switch mode locally
  load <RxC> <v1> <v2> ...     send a matrix (input mode)
  gen <RxC> <count>            generate random matrices (generate mode)
  stats                        refresh the statistics table (display mode)
  dim <RxC>                    pick a dimension from the table
  op <add|mul|scalar|transpose|conv>
                               choose an operation (calc mode)
  pick <id>                    choose a matrix by identifier
  confirm | cancel             finish the calculation handshake
  reset                        discard the active mode's progress
  connect <endpoint> [baud]    open a serial port or socket://host:port
  disconnect                   close the link
  help | quit";

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Action(Action),
    Mode(ModeKey),
    Connect { endpoint: String, baud: Option<u32> },
    Disconnect,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArg(&'static str),
    #[error("invalid {what} '{value}'")]
    InvalidValue { what: &'static str, value: String },
}

fn invalid(what: &'static str, value: &str) -> ConsoleError {
    ConsoleError::InvalidValue {
        what,
        value: value.to_string(),
    }
}

/// Parses `RxC` (also `R,C`) into a dimension.
pub fn parse_dims(text: &str) -> Result<Dimension, ConsoleError> {
    let (rows, cols) = text
        .split_once(['x', 'X', ','])
        .ok_or_else(|| invalid("dimension", text))?;
    let rows = rows.trim().parse().map_err(|_| invalid("dimension", text))?;
    let cols = cols.trim().parse().map_err(|_| invalid("dimension", text))?;
    Dimension::new(rows, cols).ok_or_else(|| invalid("dimension", text))
}

fn parse_operation(text: &str) -> Result<OperationKind, ConsoleError> {
    if let Some(op) = OperationKind::from_name(text) {
        return Ok(op);
    }
    text.parse::<u8>()
        .ok()
        .and_then(|code| OperationKind::ALL.into_iter().find(|op| op.code() == code))
        .ok_or_else(|| invalid("operation", text))
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Err(ConsoleError::MissingArg("command"));
    };

    let action = match command.to_ascii_lowercase().as_str() {
        "help" | "?" => return Ok(ConsoleCommand::Help),
        "quit" | "exit" => return Ok(ConsoleCommand::Quit),
        "disconnect" => return Ok(ConsoleCommand::Disconnect),
        "connect" => {
            let endpoint = parts.next().ok_or(ConsoleError::MissingArg("endpoint"))?;
            let baud = parts
                .next()
                .map(|b| b.parse().map_err(|_| invalid("baud rate", b)))
                .transpose()?;
            return Ok(ConsoleCommand::Connect {
                endpoint: endpoint.to_string(),
                baud,
            });
        }
        "mode" => {
            let key = parts.next().ok_or(ConsoleError::MissingArg("mode"))?;
            let key = key.strip_prefix("mode-").unwrap_or(key);
            let mode = ModeKey::from_key(key).ok_or_else(|| invalid("mode", key))?;
            return Ok(ConsoleCommand::Mode(mode));
        }
        "load" => {
            let dims = parse_dims(parts.next().ok_or(ConsoleError::MissingArg("dimension"))?)?;
            let values = parts
                .map(|v| v.parse::<i64>().map_err(|_| invalid("value", v)))
                .collect::<Result<Vec<_>, _>>()?;
            Action::LoadMatrix { dims, values }
        }
        "gen" => {
            let dims = parse_dims(parts.next().ok_or(ConsoleError::MissingArg("dimension"))?)?;
            let count = parts.next().ok_or(ConsoleError::MissingArg("count"))?;
            let count = count.parse().map_err(|_| invalid("count", count))?;
            Action::Generate { dims, count }
        }
        "stats" => Action::RefreshStatistics,
        "dim" => {
            let dims = parse_dims(parts.next().ok_or(ConsoleError::MissingArg("dimension"))?)?;
            Action::SelectDimension(dims)
        }
        "op" => {
            let op = parts.next().ok_or(ConsoleError::MissingArg("operation"))?;
            Action::SelectOperation(parse_operation(op)?)
        }
        "pick" => {
            // Identifier lines are free text; keep the rest of the line.
            let id = parts.collect::<Vec<_>>().join(" ");
            if id.is_empty() {
                return Err(ConsoleError::MissingArg("matrix id"));
            }
            Action::SelectMatrix(id)
        }
        "confirm" => Action::Confirm,
        "cancel" => Action::Cancel,
        "reset" => Action::Reset,
        _ => return Err(ConsoleError::UnknownCommand(command.to_string())),
    };
    Ok(ConsoleCommand::Action(action))
}
