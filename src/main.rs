use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use crossterm::style::Stylize;
use mx_client::channel::Consumer;
use mx_client::console::{self, ConsoleCommand, HELP};
use mx_client::encoding::hex;
use mx_client::modes::CalcResult;
use mx_client::{logging, ByteChannel, Config, Event, LinkEvent, Matrix, Session};
use tracing::error;

const BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Command-line client for the FPGA matrix unit.
#[derive(Debug, Parser)]
#[command(name = "matrix_cli", version, about)]
struct Args {
    /// Serial device path or socket://host:port. Prompts when omitted.
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate for serial devices.
    #[arg(short, long)]
    baud: Option<u32>,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// List serial ports and exit.
    #[arg(long)]
    list_ports: bool,
}

// Everything the main loop reacts to, from either side.
enum Input {
    Link(LinkEvent),
    Operator(String),
    Eof,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init(args.log_file.as_deref()) {
        eprintln!("[ERROR] Could not set up logging: {e}");
    }

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                report(&format!("{e}"));
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    if args.list_ports {
        list_ports();
        return ExitCode::SUCCESS;
    }

    println!("==========================");
    println!("   FPGA Matrix Client     ");
    println!("==========================");

    let (tx, rx) = mpsc::sync_channel::<Input>(config.link.queue_capacity);
    let link_tx = tx.clone();
    // Never block the reader: a full queue hands the event back for a retry.
    let consumer: Consumer = Arc::new(move |event| match link_tx.try_send(Input::Link(event)) {
        Err(TrySendError::Full(Input::Link(event))) => Err(event),
        _ => Ok(()),
    });
    let channel = ByteChannel::new(
        consumer,
        config.link.poll_interval(),
        config.link.connect_timeout(),
    );
    let mut session = Session::new(channel, &config);

    let target = match args.port.clone().or_else(|| config.link.endpoint.clone()) {
        Some(port) => Some((port, args.baud.unwrap_or(config.link.baud))),
        None => select_port(args.baud),
    };
    if let Some((endpoint, baud)) = target {
        connect(&mut session, &endpoint, baud);
    } else {
        info("Not connected. Use 'connect <endpoint> [baud]'.");
    }
    info("Type 'help' for commands.");

    spawn_stdin(tx);

    while let Ok(input) = rx.recv() {
        match input {
            Input::Link(LinkEvent::Data(bytes)) => {
                for event in session.ingest(&bytes) {
                    show(&event);
                }
            }
            Input::Link(LinkEvent::Closed { reason }) => {
                report(&format!("Link lost: {reason}"));
                session.sink_mut().disconnect();
                session.clear_partial();
            }
            Input::Operator(line) => {
                if !run_command(&mut session, &config, &line) {
                    break;
                }
            }
            Input::Eof => break,
        }
    }

    session.sink_mut().disconnect();
    ExitCode::SUCCESS
}

// Returns false when the operator asked to quit.
fn run_command(session: &mut Session<ByteChannel>, config: &Config, line: &str) -> bool {
    if line.trim().is_empty() {
        return true;
    }
    let command = match console::parse_command(line) {
        Ok(command) => command,
        Err(e) => {
            report(&e.to_string());
            return true;
        }
    };

    let events = match command {
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Help => {
            println!("{HELP}");
            return true;
        }
        ConsoleCommand::Connect { endpoint, baud } => {
            connect(session, &endpoint, baud.unwrap_or(config.link.baud));
            return true;
        }
        ConsoleCommand::Disconnect => {
            session.sink_mut().disconnect();
            info("Disconnected.");
            return true;
        }
        ConsoleCommand::Mode(key) => session.switch_mode(key),
        ConsoleCommand::Action(action) => session.perform(&action),
    };

    match events {
        Ok(events) => events.iter().for_each(show),
        Err(e) => report(&e.to_string()),
    }
    true
}

fn connect(session: &mut Session<ByteChannel>, endpoint: &str, baud: u32) {
    match session.sink_mut().connect(endpoint, baud) {
        Ok(()) => info(&format!("Connected to {endpoint} at {baud} baud.")),
        Err(e) => report(&e.to_string()),
    }
}

fn spawn_stdin(tx: SyncSender<Input>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Input::Operator(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        let _ = tx.send(Input::Eof);
    });
}

fn list_ports() {
    match serialport::available_ports() {
        Ok(ports) if ports.is_empty() => println!("No serial ports found."),
        Ok(ports) => {
            for port in ports {
                println!("{}", port.port_name);
            }
        }
        Err(e) => report(&format!("Could not enumerate serial ports: {e}")),
    }
}

fn prompt(label: &str) -> Option<String> {
    print!("{label}");
    io::stdout().flush().ok()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer).ok()?;
    Some(answer.trim().to_string())
}

// Interactive port and baud selection.
fn select_port(baud: Option<u32>) -> Option<(String, u32)> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            report(&format!("Could not enumerate serial ports: {e}"));
            return None;
        }
    };
    if ports.is_empty() {
        report("No serial ports found.");
        return None;
    }

    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port.port_name);
    }
    let choice = prompt("Select a port (number, empty to skip): ")?;
    if choice.is_empty() {
        return None;
    }
    let Some(port) = choice.parse::<usize>().ok().and_then(|i| ports.get(i)) else {
        report("Invalid port selection.");
        return None;
    };

    if let Some(baud) = baud {
        return Some((port.port_name.clone(), baud));
    }
    println!("Available baud rates:");
    for (i, rate) in BAUD_RATES.iter().enumerate() {
        println!("  {}: {}", i, rate);
    }
    let choice = prompt("Select a baud rate (number): ")?;
    let Some(&baud) = choice.parse::<usize>().ok().and_then(|i| BAUD_RATES.get(i)) else {
        report("Invalid baud rate selection.");
        return None;
    };
    Some((port.port_name.clone(), baud))
}

fn show(event: &Event) {
    match event {
        Event::Transmitted(bytes) => println!("{} {}", "TX >".green(), hex(bytes)),
        Event::ModeChanged(key) => info(&format!("Mode: {key}")),
        Event::StatisticsEntry(entry) => {
            println!("{} {} x{}", "RX <".cyan(), entry.dims, entry.count)
        }
        Event::StatisticsReady(entries) => {
            let listed: Vec<String> = entries
                .iter()
                .map(|e| format!("{} ({})", e.dims, e.count))
                .collect();
            info(&format!("Available: {}", listed.join(", ")));
        }
        Event::MatrixIdentified(id) => println!("{} {}", "RX <".cyan(), id),
        Event::MatrixReady(matrix) => print_matrix(matrix),
        Event::BatchComplete { received } => info(&format!("Received {received} matrices.")),
        Event::EchoProgress { operand, rows } => {
            if let Some(row) = rows.last() {
                println!("{} {operand}: {row}", "RX <".cyan());
            }
        }
        Event::EchoVerified(operand) => info(&format!("Operand {operand} verified.")),
        Event::AwaitingConfirmation => info("Type 'confirm' to compute or 'cancel' to abort."),
        Event::ResultReady(result) => print_result(result),
        Event::Cancelled => info("Calculation cancelled."),
    }
}

fn print_matrix(matrix: &Matrix) {
    let title = matrix.id().unwrap_or("matrix");
    println!("{} {} [{}]", "RX <".cyan(), title, matrix.dims());
    for row in matrix.rows() {
        println!("     {row}");
    }
}

fn print_result(result: &CalcResult) {
    println!("{} {} result", "RX <".cyan(), result.operation);
    for row in &result.rows {
        println!("     {row}");
    }
}

fn info(message: &str) {
    println!("INF {message}");
}

fn report(message: &str) {
    eprintln!("{} {message}", "ERR !".red());
}
