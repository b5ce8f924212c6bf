//! Incremental UTF-8 decoding and line splitting for chunked bodies.

use std::char::REPLACEMENT_CHARACTER;

/// Turns arbitrary byte chunks into complete text lines.
///
/// A multi-byte sequence split across chunks is held until its remaining
/// bytes arrive. Invalid sequences decode to U+FFFD. Lines end at `\n`;
/// a trailing `\r` is stripped.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
    text: String,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the lines it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        self.decode_pending(false);
        self.take_lines()
    }

    /// End of input: flush whatever is left as a final line.
    pub fn finish(&mut self) -> Option<String> {
        self.decode_pending(true);
        if self.text.is_empty() {
            return None;
        }
        let mut rest = std::mem::take(&mut self.text);
        if rest.ends_with('\r') {
            rest.pop();
        }
        Some(rest)
    }

    fn decode_pending(&mut self, flush: bool) {
        let input = std::mem::take(&mut self.pending);
        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    self.text.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    self.text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            self.text.push(REPLACEMENT_CHARACTER);
                            rest = &tail[bad..];
                        }
                        None if flush => {
                            self.text.push(REPLACEMENT_CHARACTER);
                            rest = &[];
                            break;
                        }
                        None => {
                            rest = tail;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.text.find('\n') {
            let mut line: String = self.text.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }
}
