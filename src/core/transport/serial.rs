//! Serial port transport implementation

use super::{TransportStats, TransportTrait, TransportType};
use crate::core::error::{Error, Result};
use crate::core::protocol::{LineFramer, RawFrame, DEFAULT_MAX_LINE_LEN};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Controller link speed
pub const BAUD_RATE: u32 = 9600;

/// How long a single read waits before it is silently retried
///
/// The protocol has no idle keep-alive, so an expired read is not an error.
const READ_POLL: Duration = Duration::from_secs(60);

/// Serial port configuration
///
/// Link parameters are fixed by the controllers (9600 baud, 8N1, no flow
/// control); only the device path and framer limit are configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., /dev/ttyU0, /dev/ttyUSB0, COM3)
    pub port: String,
    /// Framer limit on bytes buffered without a terminator
    pub max_line_length: usize,
}

impl SerialConfig {
    /// Create a new serial configuration with default settings
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            max_line_length: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// Set the framer limit
    #[must_use]
    pub fn max_line_length(mut self, limit: usize) -> Self {
        self.max_line_length = limit;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyU0")
    }
}

/// Reader that turns expired serial reads into another wait
struct BlockingRead<'a, P: Read + ?Sized>(&'a mut P);

impl<P: Read + ?Sized> Read for BlockingRead<'_, P> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            match self.0.read(buf) {
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    continue
                }
                other => return other,
            }
        }
    }
}

/// Live transport over a serial port or any other byte stream
pub struct LiveTransport<P = Box<dyn SerialPort>> {
    name: String,
    port: Option<P>,
    framer: LineFramer,
    stats: TransportStats,
}

impl LiveTransport<Box<dyn SerialPort>> {
    /// Open a serial port with the controller's link parameters
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(READ_POLL)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => {
                    Error::communication(format!("port not found: {}", config.port))
                }
                serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
                    Error::communication(format!("permission denied: {}", config.port))
                }
                _ => Error::communication(format!("failed to open {}: {}", config.port, e)),
            })?;

        tracing::info!("Opened {} @ {} baud (8N1)", config.port, BAUD_RATE);
        Ok(Self::from_stream(&config.port, port, config.max_line_length))
    }
}

impl<P: Read + Write + Send> LiveTransport<P> {
    /// Wrap an already open byte stream
    pub fn from_stream(name: &str, stream: P, max_line_length: usize) -> Self {
        Self {
            name: name.to_string(),
            port: Some(stream),
            framer: LineFramer::with_max_len(max_line_length),
            stats: TransportStats::default(),
        }
    }
}

impl<P: Read + Write + Send> TransportTrait for LiveTransport<P> {
    fn next_line(&mut self) -> Result<String> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::communication("serial port not connected"))?;

        match self.framer.read_line(&mut BlockingRead(port)) {
            Ok(line) => {
                self.stats.lines_received += 1;
                Ok(line)
            }
            Err(e) => {
                self.stats.errors += 1;
                Err(e)
            }
        }
    }

    fn send(&mut self, frame: &RawFrame) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::communication("serial port not connected"))?;

        port.write_all(frame.as_bytes())
            .and_then(|()| port.flush())
            .map_err(|e| Error::communication(format!("write to {} failed: {}", self.name, e)))?;

        self.stats.frames_sent += 1;
        tracing::debug!("Sent {:?} on {}", frame.as_str(), self.name);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            self.framer.reset();
            tracing::info!("Closed {}", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Live
    }

    fn connection_info(&self) -> String {
        format!("{} @ {} baud (8N1)", self.name, BAUD_RATE)
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
    serialport::available_ports()
        .map_err(|e| Error::communication(format!("cannot enumerate ports: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(bytes: &[u8]) -> LiveTransport<Cursor<Vec<u8>>> {
        LiveTransport::from_stream("test", Cursor::new(bytes.to_vec()), DEFAULT_MAX_LINE_LEN)
    }

    #[test]
    fn test_lines_from_stream() {
        let mut transport = stream(b"0011000106111111015\r0010000102=?096\r");
        assert_eq!(transport.next_line().unwrap(), "0011000106111111015\r");
        assert_eq!(transport.next_line().unwrap(), "0010000102=?096\r");
        assert!(matches!(transport.next_line(), Err(Error::Communication(_))));

        let stats = transport.stats();
        assert_eq!(stats.lines_received, 2);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut transport = stream(b"0011000106111111015\r");
        assert!(transport.is_open());
        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert!(matches!(transport.next_line(), Err(Error::Communication(_))));
    }

    #[test]
    fn test_blocking_read_retries_timeouts() {
        struct Flaky {
            timeouts: usize,
            data: Cursor<Vec<u8>>,
        }
        impl Read for Flaky {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.timeouts > 0 {
                    self.timeouts -= 1;
                    return Err(std::io::Error::new(ErrorKind::TimedOut, "timeout"));
                }
                self.data.read(buf)
            }
        }

        let mut flaky = Flaky {
            timeouts: 3,
            data: Cursor::new(b"0010000102=?096\r".to_vec()),
        };
        let mut framer = LineFramer::new();
        let line = framer.read_line(&mut BlockingRead(&mut flaky)).unwrap();
        assert_eq!(line, "0010000102=?096\r");
    }

    #[test]
    fn test_connection_info() {
        let transport = stream(b"");
        assert_eq!(transport.connection_info(), "test @ 9600 baud (8N1)");
        assert_eq!(transport.transport_type(), TransportType::Live);
    }
}
