//! Line framing over a byte stream.
//!
//! # Responsibilities
//! - Accumulate inbound bytes until complete `\n`-terminated lines exist
//! - Hold a partial trailing line until a later read completes it
//! - Track partially written outbound data
//!
//! # Design Decisions
//! - Index-based scanning: only the bytes appended since the last scan are
//!   searched for a terminator
//! - The configured capacity is a hard ceiling on the inbound backlog and the
//!   high-water mark of the outbound buffer

use thiserror::Error;

/// Framing failures. All of them are fatal for the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A partial line grew past the configured capacity.
    #[error("line exceeds buffer capacity of {capacity} bytes")]
    Overflow { capacity: usize },
}

/// Inbound accumulation buffer.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Bytes before this index are known to contain no terminator.
    scanned: usize,
    capacity: usize,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            capacity,
        }
    }

    /// Append a chunk and return every line it completed, terminators included.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = self.buf[cursor..].iter().position(|&b| b == b'\n') {
            let end = cursor + offset + 1;
            lines.push(self.buf[start..end].to_vec());
            start = end;
            cursor = end;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();

        if self.buf.len() > self.capacity {
            return Err(FrameError::Overflow {
                capacity: self.capacity,
            });
        }
        Ok(lines)
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Outbound pending-write buffer.
#[derive(Debug)]
pub struct OutboundBuffer {
    buf: Vec<u8>,
    high_water: usize,
}

impl OutboundBuffer {
    pub fn new(high_water: usize) -> Self {
        Self {
            buf: Vec::new(),
            high_water,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Data still waiting to be written.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Drop the first `n` bytes after a (possibly partial) write.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether producers may keep appending.
    pub fn has_room(&self) -> bool {
        self.buf.len() < self.high_water
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Strip a trailing `\r\n` or `\n`.
pub fn trim_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// A lone `.` ends a multi-line reply. Dot-stuffed lines (`..`) do not.
pub fn is_terminator(line: &[u8]) -> bool {
    trim_terminator(line) == b"."
}

pub fn is_positive(line: &[u8]) -> bool {
    line.starts_with(b"+OK")
}

pub fn is_negative(line: &[u8]) -> bool {
    line.starts_with(b"-ERR")
}

/// Terminate `text` with CRLF unless it already ends with a newline.
pub fn crlf(text: &str) -> Vec<u8> {
    let mut line = text.as_bytes().to_vec();
    if !line.ends_with(b"\n") {
        line.extend_from_slice(b"\r\n");
    }
    line
}
