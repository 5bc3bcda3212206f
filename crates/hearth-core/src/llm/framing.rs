//! Incremental record framing for streamed response bodies
//!
//! Response bodies arrive as arbitrary byte ranges. [`LineBuffer`] keeps the
//! unterminated tail of every read and prefixes it onto the next one, so a
//! record boundary that falls across two reads is never misparsed. Lines are
//! split on raw `\n` bytes before UTF-8 decoding, which also keeps multi-byte
//! characters intact when a read ends in the middle of one.
//!
//! [`RecordReader`] turns lines into [`Record`]s according to a [`Framing`]:
//!
//! - `Ndjson` (Ollama): every non-blank line is one JSON record
//! - `Sse` (DeepSeek): `data: <json>` lines are records, `data: [DONE]` ends
//!   the stream, comments (`:`) and other SSE fields are ignored

use super::{CancelToken, LlmError};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

/// Size of a single read from the underlying body
const READ_BUF_SIZE: usize = 8 * 1024;

/// Carry-over buffer that splits incoming bytes into complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and move every completed line into `out`.
    ///
    /// The unterminated remainder stays buffered for the next call.
    pub fn push(&mut self, bytes: &[u8], out: &mut VecDeque<String>) {
        self.pending.extend_from_slice(bytes);

        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            out.push_back(decode_line(&self.pending[start..end]));
            start = end + 1;
        }

        self.pending.drain(..start);
    }

    /// Take whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }

    /// Bytes currently held back waiting for a line terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let line = String::from_utf8_lossy(bytes);
    line.trim_end_matches('\r').to_string()
}

/// Wire framing of a streamed body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Newline-delimited JSON
    Ndjson,

    /// Server-sent events carrying JSON in `data:` fields
    Sse,
}

/// One framed unit of a streamed body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Raw JSON payload, not yet parsed
    Data(String),

    /// End-of-stream sentinel (`data: [DONE]`)
    Done,
}

impl Framing {
    /// Classify a complete line, returning `None` for lines that carry no record
    pub fn classify(&self, line: &str) -> Option<Record> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match self {
            Framing::Ndjson => Some(Record::Data(line.to_string())),
            Framing::Sse => {
                if line.starts_with(':') {
                    return None;
                }
                let data = line.strip_prefix("data:")?.trim_start();
                if data == "[DONE]" {
                    Some(Record::Done)
                } else {
                    Some(Record::Data(data.to_string()))
                }
            }
        }
    }
}

/// Pulls framed records out of a byte stream, one read at a time.
///
/// The cancel token is checked on every iteration; once it is set the
/// reader drops everything it has buffered and ends without an error.
pub struct RecordReader<R> {
    reader: R,
    framing: Framing,
    lines: LineBuffer,
    queue: VecDeque<String>,
    buf: Vec<u8>,
    cancel: CancelToken,
    eof: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R, framing: Framing, cancel: CancelToken) -> Self {
        Self {
            reader,
            framing,
            lines: LineBuffer::new(),
            queue: VecDeque::new(),
            buf: vec![0; READ_BUF_SIZE],
            cancel,
            eof: false,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn stop(&mut self) {
        self.eof = true;
        self.queue.clear();
        self.lines = LineBuffer::new();
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancel.is_cancelled() {
                self.stop();
                return None;
            }

            if let Some(line) = self.queue.pop_front() {
                match self.framing.classify(&line) {
                    Some(record) => return Some(Ok(record)),
                    None => continue,
                }
            }

            if self.eof {
                return None;
            }

            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    if let Some(rest) = self.lines.finish() {
                        self.queue.push_back(rest);
                    }
                }
                Ok(n) => self.lines.push(&self.buf[..n], &mut self.queue),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.stop();
                    return Some(Err(LlmError::Connection(format!(
                        "stream interrupted: {}",
                        e
                    ))));
                }
            }
        }
    }
}
