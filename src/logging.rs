//! Tracing subscriber setup.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the subscriber: `RUST_LOG` filtering over a plain fmt layer.
pub fn build_subscriber(writer: BoxMakeWriter, ansi: bool) -> impl tracing::Subscriber + Send + Sync {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false);

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}

/// Installs the global subscriber, logging to `log_file` (truncated) or to
/// stderr.
pub fn init(log_file: Option<&Path>) -> io::Result<()> {
    let subscriber = match log_file {
        Some(path) => build_subscriber(BoxMakeWriter::new(Arc::new(File::create(path)?)), false),
        None => build_subscriber(BoxMakeWriter::new(io::stderr), true),
    };
    subscriber.try_init().map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn writes_events_to_file() {
        let log_file = NamedTempFile::new().unwrap();
        let writer = BoxMakeWriter::new(Arc::new(log_file.reopen().unwrap()));
        let subscriber = build_subscriber(writer, false);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(lines = 1, "line buffer overflow");
            tracing::trace!("not shown at the default level");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("WARN"));
        assert!(contents.contains("line buffer overflow"));
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(!contents.contains("not shown"));
        }
    }
}
