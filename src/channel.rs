//! Byte transport to the device.
//!
//! A [`ByteChannel`] owns one connection, either a serial port or a TCP socket
//! (`socket://host:port`, used with device simulators). Reading happens on a
//! background thread that polls with a short timeout and hands every chunk to
//! the registered consumer; sending happens on the caller's thread.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, trace};

use crate::error::LinkError;

const SOCKET_PREFIX: &str = "socket://";
const READ_CHUNK: usize = 1024;

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Serial device path (`/dev/ttyUSB0`, `COM3`).
    Serial(String),
    /// `host:port` of a TCP device simulator.
    Tcp(String),
}

impl Endpoint {
    pub fn parse(text: &str) -> Result<Self, LinkError> {
        let text = text.trim();
        if let Some(addr) = text.strip_prefix(SOCKET_PREFIX) {
            let valid = addr
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            return if valid {
                Ok(Endpoint::Tcp(addr.to_string()))
            } else {
                Err(LinkError::InvalidEndpoint(text.to_string()))
            };
        }
        if text.is_empty() {
            return Err(LinkError::InvalidEndpoint(text.to_string()));
        }
        Ok(Endpoint::Serial(text.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Serial(path) => f.write_str(path),
            Endpoint::Tcp(addr) => write!(f, "{SOCKET_PREFIX}{addr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected { endpoint: Endpoint, baud: u32 },
}

/// What the reader thread delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Data(Vec<u8>),
    /// The reader stopped after a read failure or end of stream.
    Closed { reason: String },
}

/// Receives reader output. Must not block: when it cannot take an event
/// right now it hands it back, and the reader retries after one poll
/// interval unless the channel is being closed.
pub type Consumer = Arc<dyn Fn(LinkEvent) -> Result<(), LinkEvent> + Send + Sync>;

type Halves = (Box<dyn Read + Send>, Box<dyn Write + Send>);

/// Outbound half of a connection, as seen by the session.
pub trait CommandSink {
    fn is_connected(&self) -> bool;
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

struct Open {
    writer: Box<dyn Write + Send>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

pub struct ByteChannel {
    consumer: Consumer,
    poll_interval: Duration,
    connect_timeout: Duration,
    state: ConnectionState,
    open: Option<Open>,
}

impl fmt::Debug for ByteChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteChannel")
            .field("state", &self.state)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl ByteChannel {
    pub fn new(consumer: Consumer, poll_interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            consumer,
            poll_interval,
            connect_timeout,
            state: ConnectionState::Disconnected,
            open: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Opens `endpoint`, replacing any existing connection. `baud` is
    /// ignored for TCP endpoints.
    pub fn connect(&mut self, endpoint: &str, baud: u32) -> Result<(), LinkError> {
        let endpoint = Endpoint::parse(endpoint)?;
        self.disconnect();

        let (reader, writer) = match &endpoint {
            Endpoint::Serial(path) => self.open_serial(path, baud),
            Endpoint::Tcp(addr) => self.open_tcp(addr),
        }
        .map_err(|source| {
            error!(%endpoint, %source, "failed to open link");
            LinkError::Open {
                endpoint: endpoint.to_string(),
                source,
            }
        })?;

        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_reader(
            reader,
            Arc::clone(&stop),
            Arc::clone(&self.consumer),
            self.poll_interval,
        );

        info!(%endpoint, baud, "connected");
        self.open = Some(Open {
            writer,
            stop,
            reader: Some(handle),
        });
        self.state = ConnectionState::Connected { endpoint, baud };
        Ok(())
    }

    /// Stops the reader and closes the handle. Always leaves the channel
    /// disconnected.
    pub fn disconnect(&mut self) {
        if let Some(mut open) = self.open.take() {
            open.stop.store(true, Ordering::Release);
            if let Some(reader) = open.reader.take() {
                // Called from the consumer on the reader thread itself: just let it exit.
                if reader.thread().id() != thread::current().id() {
                    let _ = reader.join();
                }
            }
            info!("disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    fn open_serial(&self, path: &str, baud: u32) -> io::Result<Halves> {
        let port = serialport::new(path, baud).timeout(self.poll_interval).open()?;
        let reader = port.try_clone()?;
        Ok((Box::new(reader), Box::new(port)))
    }

    fn open_tcp(&self, addr: &str) -> io::Result<Halves> {
        let target = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for {addr}"))
        })?;
        let stream = TcpStream::connect_timeout(&target, self.connect_timeout)?;
        stream.set_read_timeout(Some(self.poll_interval))?;
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        Ok((Box::new(reader), Box::new(stream)))
    }
}

impl CommandSink for ByteChannel {
    fn is_connected(&self) -> bool {
        self.open.is_some()
    }

    /// Writes `bytes` in full. A write failure drops the connection.
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let Some(open) = self.open.as_mut() else {
            return Err(LinkError::NotConnected);
        };
        let written = open
            .writer
            .write_all(bytes)
            .and_then(|()| open.writer.flush());
        if let Err(e) = written {
            error!(error = %e, "write failed, closing link");
            self.disconnect();
            return Err(LinkError::Write(e));
        }
        Ok(())
    }
}

impl Drop for ByteChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// Returns false when the channel was stopped before the consumer took the event.
fn deliver(consumer: &Consumer, stop: &AtomicBool, poll: Duration, mut event: LinkEvent) -> bool {
    loop {
        match consumer(event) {
            Ok(()) => return true,
            Err(rejected) => {
                if stop.load(Ordering::Acquire) {
                    debug!("consumer full while stopping, dropping event");
                    return false;
                }
                event = rejected;
                thread::sleep(poll);
            }
        }
    }
}

fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    stop: Arc<AtomicBool>,
    consumer: Consumer,
    poll: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        while !stop.load(Ordering::Acquire) {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("link reached end of stream");
                    let closed = LinkEvent::Closed {
                        reason: "connection closed by peer".to_string(),
                    };
                    deliver(&consumer, &stop, poll, closed);
                    break;
                }
                Ok(n) => {
                    trace!(bytes = n, "received");
                    if !deliver(&consumer, &stop, poll, LinkEvent::Data(buf[..n].to_vec())) {
                        break;
                    }
                }
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    error!(error = %e, "read failed, stopping reader");
                    let closed = LinkEvent::Closed {
                        reason: e.to_string(),
                    };
                    deliver(&consumer, &stop, poll, closed);
                    break;
                }
            }
        }
    })
}
