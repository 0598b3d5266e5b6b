//! Line framing
//!
//! Assembles carriage-return terminated ASCII lines from a byte stream, one
//! byte at a time. Illegal bytes fail immediately instead of being buffered
//! up to the next terminator.

use super::packet::TERMINATOR;
use crate::core::error::{Error, Result, Violation};
use std::io::{ErrorKind, Read};

/// Default limit on buffered bytes without a terminator
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

/// Framer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramerState {
    /// Collecting bytes of the current line
    #[default]
    Accumulating,
    /// A line was just yielded
    Complete,
}

/// Byte-at-a-time line assembler
#[derive(Debug)]
pub struct LineFramer {
    state: FramerState,
    buffer: Vec<u8>,
    max_len: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Create a framer with the default length limit
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Create a framer that gives up after `max_len` bytes without terminator
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            state: FramerState::Accumulating,
            buffer: Vec::with_capacity(max_len.min(DEFAULT_MAX_LINE_LEN)),
            max_len: max_len.max(1),
        }
    }

    /// Current state
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Number of bytes buffered for the current line
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = FramerState::Accumulating;
    }

    /// Hand back the partial line as text and start over
    fn take_received(&mut self) -> String {
        let received = self.buffer.iter().map(|&b| char::from(b)).collect();
        self.reset();
        received
    }

    fn is_illegal(byte: u8) -> bool {
        (byte < 0x20 && byte != TERMINATOR) || byte > 0x7F
    }

    /// Feed one byte; returns the line once its terminator arrives
    pub fn push(&mut self, byte: u8) -> Result<Option<String>> {
        if self.state == FramerState::Complete {
            self.state = FramerState::Accumulating;
        }

        if Self::is_illegal(byte) {
            let received = self.take_received();
            tracing::warn!("Discarding line on illegal byte 0x{:02X}", byte);
            return Err(Violation::IllegalByte { byte, received }.into());
        }

        if self.buffer.len() >= self.max_len {
            let received = self.take_received();
            tracing::warn!("Discarding line longer than {} bytes", self.max_len);
            return Err(Violation::LineTooLong {
                limit: self.max_len,
                received,
            }
            .into());
        }

        self.buffer.push(byte);
        if byte != TERMINATOR {
            return Ok(None);
        }

        // Only bytes up to 0x7F get this far, so every byte is one char
        let line: String = self.buffer.iter().map(|&b| char::from(b)).collect();
        self.buffer.clear();
        self.state = FramerState::Complete;
        tracing::debug!("Assembled line {:?}", line);
        Ok(Some(line))
    }

    /// Read from `reader` until a complete line has been assembled
    ///
    /// Reads a single byte per call into the source, so nothing past the
    /// terminator is consumed. End of input before the terminator is a
    /// communication error, not a protocol violation.
    pub fn read_line<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<String> {
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte) {
                Ok(0) => {
                    let pending = self.buffered();
                    self.reset();
                    return Err(Error::communication(format!(
                        "byte source closed with {} bytes pending",
                        pending
                    )));
                }
                Ok(_) => {
                    if let Some(line) = self.push(byte[0])? {
                        return Ok(line);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.reset();
                    return Err(Error::communication(format!("read failed: {}", e)));
                }
            }
        }
    }
}
