//! Single consumer of link traffic.
//!
//! A [`Session`] owns the framing and mode state. Inbound chunks go through
//! [`Session::ingest`], operator actions through [`Session::perform`]; both
//! return the events produced, in order, and transmit the commands the
//! controllers queued.

use tracing::{debug, error, trace, warn};

use crate::channel::CommandSink;
use crate::config::Config;
use crate::encoding::{hex, Encoding};
use crate::error::{LinkError, Result};
use crate::framer::LineFramer;
use crate::modes::{Action, Event, ModeKey, Outbox};
use crate::router::ModeRouter;

#[derive(Debug)]
pub struct Session<S> {
    sink: S,
    framer: LineFramer,
    router: ModeRouter,
    encoding: Encoding,
}

impl<S: CommandSink> Session<S> {
    pub fn new(sink: S, config: &Config) -> Self {
        Self {
            sink,
            framer: LineFramer::new(config.protocol.max_line_len),
            router: ModeRouter::new(config),
            encoding: config.protocol.encoding,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn router(&self) -> &ModeRouter {
        &self.router
    }

    pub fn current_mode(&self) -> ModeKey {
        self.router.current_mode()
    }

    /// Lines lost to framing overflow so far.
    pub fn overflow_count(&self) -> u64 {
        self.framer.overflow_count()
    }

    /// Feeds received bytes. Commands queued in response are sent right
    /// away; a failed send is logged and does not stop processing.
    pub fn ingest(&mut self, bytes: &[u8]) -> Vec<Event> {
        let mut out = Outbox::new();
        let mut events = Vec::new();
        for line in self.framer.feed(bytes) {
            trace!(%line, "rx");
            self.router.route(&line, &mut out);
            if let Err(e) = self.flush(&mut out, &mut events) {
                error!(error = %e, "could not answer device");
            }
        }
        events
    }

    /// Applies an operator action. Nothing is sent unless the action is
    /// valid and the link is up. If the send fails the active mode is reset,
    /// since the device never saw the step the controller already took.
    pub fn perform(&mut self, action: &Action) -> Result<Vec<Event>> {
        if !self.sink.is_connected() && !matches!(action, Action::Reset) {
            return Err(LinkError::NotConnected.into());
        }
        let mut out = Outbox::new();
        self.router.apply(action, &mut out)?;
        let mut events = Vec::new();
        if let Err(e) = self.flush(&mut out, &mut events) {
            warn!(action = action.name(), error = %e, "send failed, resetting mode");
            self.router.reset_active();
            return Err(e.into());
        }
        Ok(events)
    }

    /// Forces a mode switch from the operator side.
    pub fn switch_mode(&mut self, key: ModeKey) -> Result<Vec<Event>> {
        let mut out = Outbox::new();
        self.router.switch_to(key, &mut out);
        let mut events = Vec::new();
        self.flush(&mut out, &mut events)?;
        Ok(events)
    }

    /// Drops a partial line, e.g. after the link was lost.
    pub fn clear_partial(&mut self) {
        if !self.framer.partial().is_empty() {
            warn!(partial = self.framer.partial(), "discarding partial line");
        }
        self.framer.clear();
    }

    // Sends every queued command, then appends queued events. Stops at the
    // first failed send; events queued so far are still returned.
    fn flush(&mut self, out: &mut Outbox, events: &mut Vec<Event>) -> Result<(), LinkError> {
        let mut result = Ok(());
        for command in out.take_commands() {
            let bytes = command.encode(self.encoding);
            debug!(?command, bytes = %hex(&bytes), "tx");
            match self.sink.send(&bytes) {
                Ok(()) => events.push(Event::Transmitted(bytes)),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        events.extend(out.take_events());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{Dimension, OperationKind};
    use crate::modes::CalcPhase;

    #[derive(Debug, Default)]
    struct Recorder {
        connected: bool,
        sent: Vec<Vec<u8>>,
        fail: bool,
    }

    impl CommandSink for Recorder {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            if !self.connected {
                return Err(LinkError::NotConnected);
            }
            if self.fail {
                self.connected = false;
                return Err(LinkError::Write(std::io::Error::other("unplugged")));
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }
    }

    fn session() -> Session<Recorder> {
        let sink = Recorder {
            connected: true,
            ..Recorder::default()
        };
        Session::new(sink, &Config::default())
    }

    #[test]
    fn device_switch_to_display_transmits_query() {
        let mut s = session();
        let events = s.ingest(b"mode-d");
        assert!(events.is_empty());
        let events = s.ingest(b"is\r\n");
        assert_eq!(s.current_mode(), ModeKey::Display);
        assert_eq!(s.sink().sent, vec![vec![0, 0]]);
        assert_eq!(
            events,
            vec![
                Event::Transmitted(vec![0, 0]),
                Event::ModeChanged(ModeKey::Display)
            ]
        );
    }

    #[test]
    fn actions_need_a_connection() {
        let mut s = Session::new(Recorder::default(), &Config::default());
        s.ingest(b"mode-cal\n");
        let err = s
            .perform(&Action::SelectOperation(OperationKind::Add))
            .unwrap_err();
        assert!(matches!(err, Error::Link(LinkError::NotConnected)));
        // Reset is local and always allowed.
        assert!(s.perform(&Action::Reset).is_ok());
    }

    #[test]
    fn validation_errors_send_nothing() {
        let mut s = session();
        s.ingest(b"mode-inp\n");
        let err = s
            .perform(&Action::LoadMatrix {
                dims: Dimension::new(9, 1).unwrap(),
                values: vec![0; 9],
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(s.sink().sent.is_empty());
    }

    #[test]
    fn encoding_follows_configuration() {
        let mut config = Config::default();
        config.protocol.encoding = Encoding::Ascii;
        let sink = Recorder {
            connected: true,
            ..Recorder::default()
        };
        let mut s = Session::new(sink, &config);
        s.switch_mode(ModeKey::Generate).unwrap();
        let events = s
            .perform(&Action::Generate {
                dims: Dimension::new(2, 3).unwrap(),
                count: 4,
            })
            .unwrap();
        assert_eq!(events, vec![Event::Transmitted(b"2 3 4".to_vec())]);
    }

    #[test]
    fn failed_write_is_reported() {
        let mut s = session();
        s.ingest(b"mode-cal\n");
        s.sink_mut().fail = true;
        let err = s
            .perform(&Action::SelectOperation(OperationKind::Transpose))
            .unwrap_err();
        assert!(matches!(err, Error::Link(LinkError::Write(_))));
        assert!(!s.sink().is_connected());
    }

    #[test]
    fn failed_write_leaves_mode_at_its_start() {
        let mut s = session();
        s.ingest(b"mode-cal\n");
        s.sink_mut().fail = true;
        assert!(s
            .perform(&Action::SelectOperation(OperationKind::MatrixMul))
            .is_err());
        assert_eq!(s.router().calc().phase(), CalcPhase::SelectOp);
        assert!(s.sink().sent.is_empty());

        // After reconnecting the operation can be chosen again.
        s.sink_mut().fail = false;
        s.sink_mut().connected = true;
        let events = s
            .perform(&Action::SelectOperation(OperationKind::MatrixMul))
            .unwrap();
        assert_eq!(events, vec![Event::Transmitted(vec![1])]);
    }

    #[test]
    fn partial_line_can_be_dropped() {
        let mut s = session();
        s.ingest(b"mode-ca");
        s.clear_partial();
        s.ingest(b"l\n");
        assert_eq!(s.current_mode(), ModeKey::Idle);
    }
}
