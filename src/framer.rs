//! Newline framing for the inbound byte stream.
//!
//! Bytes are decoded as UTF-8 with invalid sequences replaced by U+FFFD. A
//! multi-byte character split across two chunks is held back until the rest
//! arrives, so the chunk boundaries never show up in the output.

use tracing::warn;

/// Ceiling on the partial-line buffer before it is flushed as one line.
pub const DEFAULT_MAX_LINE_LEN: usize = 10_000;

/// Accumulates bytes and yields complete, non-empty lines.
#[derive(Debug)]
pub struct LineFramer {
    buffer: String,
    // Trailing bytes of an incomplete UTF-8 sequence.
    undecoded: Vec<u8>,
    max_len: usize,
    overflows: u64,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: String::new(),
            undecoded: Vec::new(),
            max_len: max_len.max(1),
            overflows: 0,
        }
    }

    /// Feeds a chunk and returns every line it completed, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.decode(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let rest = self.buffer.split_off(pos + 1);
            let line = std::mem::replace(&mut self.buffer, rest);
            push_line(&mut lines, &line[..pos]);
        }

        if self.buffer.len() > self.max_len && self.buffer.chars().count() > self.max_len {
            self.overflows += 1;
            warn!(
                len = self.buffer.len(),
                max = self.max_len,
                "no newline within line limit, flushing buffer as one line"
            );
            let line = std::mem::take(&mut self.buffer);
            push_line(&mut lines, &line);
        }
        lines
    }

    /// Text received since the last newline.
    pub fn partial(&self) -> &str {
        &self.buffer
    }

    /// Number of times the buffer ceiling forced a flush.
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }

    /// Drops any partial line and undecoded bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.undecoded.clear();
    }

    fn decode(&mut self, bytes: &[u8]) {
        let mut pending = std::mem::take(&mut self.undecoded);
        pending.extend_from_slice(bytes);

        let mut input = pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.undecoded = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn push_line(lines: &mut Vec<String>, raw: &str) {
    let line = raw.trim_end_matches('\r');
    if !line.trim().is_empty() {
        lines.push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_on_newline_and_trims_carriage_return() {
        let mut framer = LineFramer::default();
        let lines = framer.feed(b"mode-dis\r\n| 2 | 2 | 1 |\n");
        assert_eq!(lines, vec!["mode-dis", "| 2 | 2 | 1 |"]);
        assert_eq!(framer.partial(), "");
    }

    #[test]
    fn retains_partial_line_between_feeds() {
        let mut framer = LineFramer::default();
        assert!(framer.feed(b"12 3").is_empty());
        assert_eq!(framer.partial(), "12 3");
        assert_eq!(framer.feed(b"4\n5"), vec!["12 34"]);
        assert_eq!(framer.partial(), "5");
    }

    #[test]
    fn drops_empty_lines() {
        let mut framer = LineFramer::default();
        assert_eq!(framer.feed(b"\n\r\n  \nabc\n\n"), vec!["abc"]);
    }

    #[test]
    fn replaces_invalid_bytes() {
        let mut framer = LineFramer::default();
        let lines = framer.feed(b"a\xffb\n");
        assert_eq!(lines, vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut framer = LineFramer::default();
        let bytes = "é\n".as_bytes();
        assert!(framer.feed(&bytes[..1]).is_empty());
        assert_eq!(framer.feed(&bytes[1..]), vec!["é"]);
    }

    #[test]
    fn overflow_flushes_whole_buffer() {
        let mut framer = LineFramer::new(8);
        assert!(framer.feed(b"12345678").is_empty());
        assert_eq!(framer.feed(b"9"), vec!["123456789"]);
        assert_eq!(framer.partial(), "");
        assert_eq!(framer.overflow_count(), 1);
        // Framing resumes normally afterwards.
        assert_eq!(framer.feed(b"ok\n"), vec!["ok"]);
    }

    fn frame_all(input: &[u8]) -> (Vec<String>, String) {
        let mut framer = LineFramer::default();
        let lines = framer.feed(input);
        (lines, framer.partial().to_string())
    }

    proptest! {
        #[test]
        fn chunking_is_transparent(
            text in "[a-c |\r\n0-9éλ-]{0,200}",
            cuts in proptest::collection::vec(0usize..200, 0..12),
        ) {
            let bytes = text.as_bytes();
            let mut points: Vec<usize> = cuts.into_iter().map(|c| c.min(bytes.len())).collect();
            points.push(0);
            points.push(bytes.len());
            points.sort_unstable();

            let mut framer = LineFramer::default();
            let mut lines = Vec::new();
            for pair in points.windows(2) {
                lines.extend(framer.feed(&bytes[pair[0]..pair[1]]));
            }

            let (expected, expected_partial) = frame_all(bytes);
            prop_assert_eq!(&lines, &expected);
            prop_assert_eq!(framer.partial(), expected_partial.as_str());

            // Lines plus the partial reproduce the input, modulo CR and blank lines.
            let reference: Vec<String> = text
                .split('\n')
                .map(|l| l.trim_end_matches('\r').to_string())
                .filter(|l| !l.trim().is_empty())
                .collect();
            let mut rebuilt = lines.clone();
            if !framer.partial().trim().is_empty() {
                rebuilt.push(framer.partial().trim_end_matches('\r').to_string());
            }
            prop_assert_eq!(rebuilt, reference);
        }
    }
}
