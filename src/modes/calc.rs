//! Multi-operand calculation.
//!
//! ```text
//! SelectOp ──op──▶ WaitStatsA ──dims──▶ WaitMatricesA ──id──┬─ binary ──▶ WaitStatsB
//!     │                                     ▲               │              │ dims (filtered)
//!     └── convolution: 3x3 requested ───────┘               │              ▼
//!                                                           │        WaitMatricesB ──id──┐
//!                                                           ▼                            │
//!                                  WaitEchoA ◀──────────────┴────────────────────────────┘
//!                                      │ rows(A)                (binary)
//!                                      ├──────────────▶ WaitEchoB ── rows(B) ──┐
//!                                      ▼                                       ▼
//!                                 AwaitConfirm ◀───────────────────────────────┘
//!                                   │ confirm (0xFF)         │ cancel (0xFE)
//!                                   ▼                        ▼
//!                               WaitResult ──rows──▶ ShowResult        SelectOp
//! ```
//!
//! Each echo is one identifier line followed by the operand's rows. The
//! number of result rows depends on the operation (see
//! [`OperationKind::result_rows`]).

use tracing::{debug, info};

use super::{unsupported, wrong_phase, Action, Event, ModeController, ModeKey, Outbox};
use crate::block::MatrixBlockParser;
use crate::config::CalcFlow;
use crate::encoding::{operand_token, Command};
use crate::error::ValidationError;
use crate::model::{
    parse_values, Dimension, Matrix, Operand, OperationKind, StatisticsEntry, CONVOLUTION_KERNEL,
};
use crate::table::{self, TableParser, TableStep};

/// Observable phase of the calculation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcPhase {
    SelectOp,
    WaitStatsA,
    WaitMatricesA,
    WaitStatsB,
    WaitMatricesB,
    WaitEchoA,
    WaitEchoB,
    AwaitConfirm,
    WaitResult,
    ShowResult,
}

impl CalcPhase {
    pub fn name(self) -> &'static str {
        match self {
            CalcPhase::SelectOp => "selecting operation",
            CalcPhase::WaitStatsA => "waiting for operand A statistics",
            CalcPhase::WaitMatricesA => "waiting for operand A matrices",
            CalcPhase::WaitStatsB => "waiting for operand B statistics",
            CalcPhase::WaitMatricesB => "waiting for operand B matrices",
            CalcPhase::WaitEchoA => "verifying operand A",
            CalcPhase::WaitEchoB => "verifying operand B",
            CalcPhase::AwaitConfirm => "awaiting confirmation",
            CalcPhase::WaitResult => "waiting for result",
            CalcPhase::ShowResult => "showing result",
        }
    }
}

/// Result block of a finished calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalcResult {
    pub operation: OperationKind,
    /// Result rows, verbatim.
    pub rows: Vec<String>,
    /// Integers found in `rows`, row-major.
    pub values: Vec<i64>,
}

impl CalcResult {
    fn new(operation: OperationKind, rows: Vec<String>) -> Self {
        let values = rows.iter().flat_map(|row| parse_values(row)).collect();
        Self {
            operation,
            rows,
            values,
        }
    }
}

/// What is known about one operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandSlot {
    pub dims: Dimension,
    pub id: Option<String>,
    /// Echoed rows, once verified.
    pub echo: Vec<String>,
}

impl OperandSlot {
    fn new(dims: Dimension) -> Self {
        Self {
            dims,
            id: None,
            echo: Vec::new(),
        }
    }
}

/// Accumulated state of one calculation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalcSession {
    operation: Option<OperationKind>,
    a: Option<OperandSlot>,
    b: Option<OperandSlot>,
    result_rows: Vec<String>,
}

impl CalcSession {
    pub fn operation(&self) -> Option<OperationKind> {
        self.operation
    }

    pub fn operand(&self, operand: Operand) -> Option<&OperandSlot> {
        match operand {
            Operand::A => self.a.as_ref(),
            Operand::B => self.b.as_ref(),
        }
    }

    fn operand_mut(&mut self, operand: Operand) -> Option<&mut OperandSlot> {
        match operand {
            Operand::A => self.a.as_mut(),
            Operand::B => self.b.as_mut(),
        }
    }

    fn set_operand(&mut self, operand: Operand, slot: OperandSlot) {
        match operand {
            Operand::A => self.a = Some(slot),
            Operand::B => self.b = Some(slot),
        }
    }

    pub fn result_rows(&self) -> &[String] {
        &self.result_rows
    }
}

#[derive(Debug)]
enum State {
    SelectOp,
    WaitStats {
        operand: Operand,
        table: TableParser,
        candidates: Vec<StatisticsEntry>,
    },
    WaitMatrices {
        operand: Operand,
        parser: MatrixBlockParser,
        received: Vec<Matrix>,
    },
    WaitEcho {
        operand: Operand,
        parser: MatrixBlockParser,
    },
    AwaitConfirm,
    WaitResult {
        expected: usize,
    },
    ShowResult(CalcResult),
}

#[derive(Debug)]
pub struct CalcController {
    flow: CalcFlow,
    session: CalcSession,
    state: State,
}

impl Default for CalcController {
    fn default() -> Self {
        Self::new(CalcFlow::default())
    }
}

impl CalcController {
    pub fn new(flow: CalcFlow) -> Self {
        Self {
            flow,
            session: CalcSession::default(),
            state: State::SelectOp,
        }
    }

    pub fn session(&self) -> &CalcSession {
        &self.session
    }

    pub fn phase(&self) -> CalcPhase {
        match &self.state {
            State::SelectOp => CalcPhase::SelectOp,
            State::WaitStats {
                operand: Operand::A,
                ..
            } => CalcPhase::WaitStatsA,
            State::WaitStats {
                operand: Operand::B,
                ..
            } => CalcPhase::WaitStatsB,
            State::WaitMatrices {
                operand: Operand::A,
                ..
            } => CalcPhase::WaitMatricesA,
            State::WaitMatrices {
                operand: Operand::B,
                ..
            } => CalcPhase::WaitMatricesB,
            State::WaitEcho {
                operand: Operand::A,
                ..
            } => CalcPhase::WaitEchoA,
            State::WaitEcho {
                operand: Operand::B,
                ..
            } => CalcPhase::WaitEchoB,
            State::AwaitConfirm => CalcPhase::AwaitConfirm,
            State::WaitResult { .. } => CalcPhase::WaitResult,
            State::ShowResult(_) => CalcPhase::ShowResult,
        }
    }

    /// Dimensions currently offered for selection.
    pub fn candidates(&self) -> &[StatisticsEntry] {
        match &self.state {
            State::WaitStats { candidates, .. } => candidates,
            _ => &[],
        }
    }

    /// Matrices received for the operand being chosen.
    pub fn received(&self) -> &[Matrix] {
        match &self.state {
            State::WaitMatrices { received, .. } => received,
            _ => &[],
        }
    }

    pub fn result(&self) -> Option<&CalcResult> {
        match &self.state {
            State::ShowResult(result) => Some(result),
            _ => None,
        }
    }

    fn operation(&self) -> Option<OperationKind> {
        self.session.operation
    }

    fn admissible(&self, operand: Operand, dims: Dimension) -> bool {
        match (operand, self.operation(), self.session.a.as_ref()) {
            (Operand::A, _, _) => true,
            (Operand::B, Some(op), Some(a)) => op.accepts_second(a.dims, dims),
            (Operand::B, _, _) => false,
        }
    }

    fn enter_stats(&mut self, operand: Operand) {
        self.state = State::WaitStats {
            operand,
            table: TableParser::new(),
            candidates: Vec::new(),
        };
    }

    fn enter_matrices(&mut self, operand: Operand, dims: Dimension, out: &mut Outbox) {
        out.send(Command::RequestDimension(dims));
        self.session.set_operand(operand, OperandSlot::new(dims));
        self.state = State::WaitMatrices {
            operand,
            parser: MatrixBlockParser::new(dims, true),
            received: Vec::new(),
        };
    }

    fn enter_echo(&mut self, operand: Operand) {
        match self.session.operand(operand) {
            Some(slot) => {
                self.state = State::WaitEcho {
                    operand,
                    parser: MatrixBlockParser::new(slot.dims, true),
                };
            }
            None => self.state = State::AwaitConfirm,
        }
    }

    fn enter_confirm(&mut self, out: &mut Outbox) {
        self.state = State::AwaitConfirm;
        out.emit(Event::AwaitingConfirmation);
    }

    fn offer(&mut self, operand: Operand, entry: StatisticsEntry, out: &mut Outbox) {
        if !self.admissible(operand, entry.dims) {
            debug!(dims = %entry.dims, %operand, "filtered out incompatible operand");
            return;
        }
        if let State::WaitStats { candidates, .. } = &mut self.state {
            candidates.push(entry);
        }
        out.emit(Event::StatisticsEntry(entry));
    }

    fn handle_stats_line(&mut self, line: &str, out: &mut Outbox) {
        let State::WaitStats { table, operand, .. } = &mut self.state else {
            return;
        };
        let operand = *operand;
        let step = table.feed(line);

        match step {
            TableStep::Entry(entry) => self.offer(operand, entry, out),
            TableStep::Closed(last) => {
                if let Some(entry) = last {
                    self.offer(operand, entry, out);
                }
                out.emit(Event::StatisticsReady(self.candidates().to_vec()));
            }
            TableStep::Terminated => {
                out.emit(Event::StatisticsReady(self.candidates().to_vec()));
                debug!(line, "unexpected line after statistics table");
            }
            TableStep::Consumed => {}
            TableStep::Unrelated => debug!(line, "waiting for statistics table, ignoring"),
        }
    }

    fn handle_matrices_line(&mut self, line: &str, out: &mut Outbox) {
        let State::WaitMatrices {
            parser, received, ..
        } = &mut self.state
        else {
            return;
        };

        if parser.awaiting_id() && table::is_table_line(line) {
            debug!(line, "skipping table line while waiting for matrix blocks");
            return;
        }

        let was_awaiting_id = parser.awaiting_id();
        match parser.feed(line) {
            Some(matrix) => {
                received.push(matrix.clone());
                out.emit(Event::MatrixReady(matrix));
            }
            None if was_awaiting_id => {
                let id = parser.current_id().unwrap_or_default().to_string();
                out.emit(Event::MatrixIdentified(id));
            }
            None => {}
        }
    }

    fn handle_echo_line(&mut self, line: &str, out: &mut Outbox) {
        let State::WaitEcho { operand, parser } = &mut self.state else {
            return;
        };
        let operand = *operand;

        let was_awaiting_id = parser.awaiting_id();
        let Some(echo) = parser.feed(line) else {
            if !was_awaiting_id {
                out.emit(Event::EchoProgress {
                    operand,
                    rows: parser.rows().to_vec(),
                });
            }
            return;
        };

        out.emit(Event::EchoProgress {
            operand,
            rows: echo.rows().to_vec(),
        });
        if let Some(slot) = self.session.operand_mut(operand) {
            slot.echo = echo.rows().to_vec();
        }
        out.emit(Event::EchoVerified(operand));

        let binary = self.operation().is_some_and(OperationKind::is_binary);
        if operand == Operand::A && binary {
            self.enter_echo(Operand::B);
        } else {
            self.enter_confirm(out);
        }
    }

    fn handle_result_line(&mut self, line: &str, out: &mut Outbox) {
        let State::WaitResult { expected } = self.state else {
            return;
        };
        self.session.result_rows.push(line.to_string());
        if self.session.result_rows.len() < expected {
            return;
        }

        let Some(operation) = self.operation() else {
            return;
        };
        let result = CalcResult::new(operation, self.session.result_rows.clone());
        info!(%operation, rows = result.rows.len(), "calculation result received");
        out.emit(Event::ResultReady(result.clone()));
        self.state = State::ShowResult(result);
    }

    fn select_operation(
        &mut self,
        action: &Action,
        op: OperationKind,
        out: &mut Outbox,
    ) -> Result<(), ValidationError> {
        if !matches!(self.state, State::SelectOp) {
            return Err(wrong_phase(action, self.phase_name()));
        }

        self.session = CalcSession {
            operation: Some(op),
            ..CalcSession::default()
        };
        out.send(Command::SelectOperation(op));

        if op == OperationKind::Convolution {
            // The kernel shape is fixed, so there is nothing to choose.
            self.enter_matrices(Operand::A, CONVOLUTION_KERNEL, out);
        } else {
            self.enter_stats(Operand::A);
        }
        Ok(())
    }

    fn select_dimension(
        &mut self,
        action: &Action,
        dims: Dimension,
        out: &mut Outbox,
    ) -> Result<(), ValidationError> {
        let State::WaitStats { operand, table, .. } = &self.state else {
            return Err(wrong_phase(action, self.phase_name()));
        };
        let operand = *operand;

        if operand == Operand::B {
            if let (Some(op), Some(a)) = (self.operation(), self.session.a.as_ref()) {
                if !op.accepts_second(a.dims, dims) {
                    return Err(ValidationError::IncompatibleOperand {
                        op,
                        first: a.dims,
                        second: dims,
                    });
                }
            }
        }
        if !table.entries().iter().any(|e| e.dims == dims) {
            return Err(ValidationError::NotOffered(dims));
        }

        if let State::WaitStats { table, .. } = &mut self.state {
            if table.is_open() {
                table.close();
                out.emit(Event::StatisticsReady(self.candidates().to_vec()));
            }
        }
        self.enter_matrices(operand, dims, out);
        Ok(())
    }

    fn select_matrix(
        &mut self,
        action: &Action,
        id: &str,
        out: &mut Outbox,
    ) -> Result<(), ValidationError> {
        let State::WaitMatrices {
            operand, received, ..
        } = &self.state
        else {
            return Err(wrong_phase(action, self.phase_name()));
        };
        let operand = *operand;
        let Some(op) = self.operation() else {
            return Err(wrong_phase(action, self.phase_name()));
        };

        let chosen = received
            .iter()
            .filter_map(Matrix::id)
            .find(|candidate| same_id(candidate, id))
            .map(str::to_string)
            .ok_or_else(|| ValidationError::UnknownMatrix(id.to_string()))?;

        out.send(Command::SelectOperand(chosen.clone()));
        if let Some(slot) = self.session.operand_mut(operand) {
            slot.id = Some(chosen);
        }

        match operand {
            Operand::A if op.is_binary() => self.enter_stats(Operand::B),
            Operand::A if self.flow == CalcFlow::ConfirmFirst => self.enter_confirm(out),
            _ => self.enter_echo(Operand::A),
        }
        Ok(())
    }

    fn confirm(&mut self, action: &Action, out: &mut Outbox) -> Result<(), ValidationError> {
        let (State::AwaitConfirm, Some(op), Some(a)) =
            (&self.state, self.operation(), self.session.a.as_ref())
        else {
            return Err(wrong_phase(action, self.phase_name()));
        };

        let expected = op.result_rows(a.dims);
        out.send(Command::Confirm);
        self.session.result_rows.clear();
        self.state = State::WaitResult { expected };
        info!(operation = %op, expected, "calculation confirmed");
        Ok(())
    }

    fn cancel(&mut self, action: &Action, out: &mut Outbox) -> Result<(), ValidationError> {
        if !matches!(self.state, State::AwaitConfirm) {
            return Err(wrong_phase(action, self.phase_name()));
        }
        out.send(Command::Cancel);
        self.reset();
        out.emit(Event::Cancelled);
        info!("calculation cancelled");
        Ok(())
    }
}

// Operators may type the bare number of an `ID: 3` line.
fn same_id(received: &str, wanted: &str) -> bool {
    let received = received.trim();
    let wanted = wanted.trim();
    received == wanted || operand_token(received) == operand_token(wanted)
}

impl ModeController for CalcController {
    fn mode(&self) -> ModeKey {
        ModeKey::Calc
    }

    fn handle_line(&mut self, line: &str, out: &mut Outbox) {
        match self.state {
            State::SelectOp => debug!(line, "no operation selected, ignoring"),
            State::WaitStats { .. } => self.handle_stats_line(line, out),
            State::WaitMatrices { .. } => self.handle_matrices_line(line, out),
            State::WaitEcho { .. } => self.handle_echo_line(line, out),
            State::AwaitConfirm => debug!(line, "awaiting confirmation, ignoring"),
            State::WaitResult { .. } => self.handle_result_line(line, out),
            State::ShowResult(_) => debug!(line, "result shown, ignoring until reset"),
        }
    }

    fn apply(&mut self, action: &Action, out: &mut Outbox) -> Result<(), ValidationError> {
        match action {
            Action::SelectOperation(op) => self.select_operation(action, *op, out),
            Action::SelectDimension(dims) => self.select_dimension(action, *dims, out),
            Action::SelectMatrix(id) => self.select_matrix(action, id, out),
            Action::Confirm => self.confirm(action, out),
            Action::Cancel => self.cancel(action, out),
            other => Err(unsupported(other, self.mode())),
        }
    }

    fn reset(&mut self) {
        self.session = CalcSession::default();
        self.state = State::SelectOp;
    }

    fn phase_name(&self) -> &'static str {
        self.phase().name()
    }
}
