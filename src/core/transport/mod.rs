//! Transport layer
//!
//! Supports:
//! - Live serial ports (RS-485 adapters at 9600 baud, 8N1)
//! - Replay of recorded JSON-lines traces
//!
//! Both produce complete lines; [`Transport`] turns lines into raw or
//! catalog-resolved packets according to a [`DeviceMap`].

mod replay;
mod serial;

pub use replay::{ReplayConfig, ReplayTransport, TraceRecord, TraceRecorder};
pub use serial::{list_ports, LiveTransport, SerialConfig, BAUD_RATE};

use crate::core::catalog::{Catalog, CatalogSet};
use crate::core::error::{Result, Violation};
use crate::core::protocol::{
    build, parse_raw, resolve, Action, DecodedPacket, RawFrame, RawPacket, Value, MAX_ADDRESS,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Transport selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// Serial port connection
    Live(SerialConfig),
    /// Trace file replay
    Replay(ReplayConfig),
}

impl TransportKind {
    /// Live connection on `port_path` with default settings
    pub fn live(port_path: &str) -> Self {
        Self::Live(SerialConfig::new(port_path))
    }

    /// Replay of `trace_path` without announcements
    pub fn replay(trace_path: impl Into<PathBuf>) -> Self {
        Self::Replay(ReplayConfig::new(trace_path))
    }
}

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Serial port
    Live,
    /// Trace replay
    Replay,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Replay => write!(f, "Replay"),
        }
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Complete lines handed out
    pub lines_received: u64,
    /// Frames written to the bus
    pub frames_sent: u64,
    /// Failed reads
    pub errors: u64,
}

/// Line source shared by all connection types
///
/// Calls block until a line is available or the source fails. A transport
/// is driven from one thread at a time.
pub trait TransportTrait: Send {
    /// Next complete line, terminator included
    fn next_line(&mut self) -> Result<String>;

    /// Write an assembled frame
    fn send(&mut self, frame: &RawFrame) -> Result<()>;

    /// Release the underlying source; safe to call repeatedly
    fn close(&mut self);

    /// Check if the source is still open
    fn is_open(&self) -> bool;

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Get connection info string
    fn connection_info(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}

/// Create a line source from configuration
pub fn create_transport(kind: TransportKind) -> Result<Box<dyn TransportTrait>> {
    match kind {
        TransportKind::Live(cfg) => Ok(Box::new(LiveTransport::open(&cfg)?)),
        TransportKind::Replay(cfg) => Ok(Box::new(ReplayTransport::open(&cfg)?)),
    }
}

/// Which catalog describes the device at each address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMap {
    devices: BTreeMap<u16, String>,
}

impl DeviceMap {
    /// Empty map; every frame stays raw
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`DeviceMap::insert`]
    pub fn with_device(mut self, address: u16, catalog: impl Into<String>) -> Result<Self> {
        self.insert(address, catalog)?;
        Ok(self)
    }

    /// Map `address` to the catalog named `catalog`
    pub fn insert(&mut self, address: u16, catalog: impl Into<String>) -> Result<()> {
        if address > MAX_ADDRESS {
            return Err(Violation::AddressOutOfRange(address).into());
        }
        self.devices.insert(address, catalog.into());
        Ok(())
    }

    /// Catalog name for `address`
    pub fn catalog_for(&self, address: u16) -> Option<&str> {
        self.devices.get(&address).map(String::as_str)
    }

    /// Fail with `UnknownCatalog` if any entry names a catalog `catalogs` lacks
    pub fn validate(&self, catalogs: &CatalogSet) -> Result<()> {
        for name in self.devices.values() {
            catalogs.catalog(name)?;
        }
        Ok(())
    }

    /// Entries in address order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &str)> {
        self.devices.iter().map(|(a, c)| (*a, c.as_str()))
    }

    /// Number of mapped addresses
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when no address is mapped
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// A received frame, resolved when its address is mapped
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    /// Address not in the device map
    Raw(RawPacket),
    /// Resolved against the address's catalog
    Decoded(DecodedPacket),
}

impl Message {
    /// The underlying frame
    pub fn raw(&self) -> &RawPacket {
        match self {
            Message::Raw(raw) => raw,
            Message::Decoded(decoded) => &decoded.raw,
        }
    }

    /// The resolved packet, if any
    pub fn decoded(&self) -> Option<&DecodedPacket> {
        match self {
            Message::Raw(_) => None,
            Message::Decoded(decoded) => Some(decoded),
        }
    }
}

/// Engine handle over one line source
///
/// The source is closed when the handle is dropped.
pub struct Transport {
    source: Box<dyn TransportTrait>,
    catalogs: Arc<CatalogSet>,
}

impl Transport {
    /// Wrap an already created line source
    pub fn new(source: Box<dyn TransportTrait>, catalogs: Arc<CatalogSet>) -> Self {
        Self { source, catalogs }
    }

    /// Next complete line, unparsed
    pub fn next_line(&mut self) -> Result<String> {
        self.source.next_line()
    }

    /// Next frame, parsed and resolved when `devices` maps its address
    ///
    /// Violations, unknown registers and source errors all surface to the
    /// caller; whether to keep reading is the caller's decision.
    pub fn next_message(&mut self, devices: &DeviceMap) -> Result<Message> {
        let line = self.source.next_line()?;
        self.interpret(&line, devices)
    }

    /// Parse and resolve a line obtained from [`Transport::next_line`]
    pub fn interpret(&self, line: &str, devices: &DeviceMap) -> Result<Message> {
        let raw = parse_raw(line)?;

        match devices.catalog_for(raw.address) {
            Some(name) => {
                let catalog = self.catalogs.catalog(name)?;
                resolve(raw, catalog).map(Message::Decoded)
            }
            None => Ok(Message::Raw(raw)),
        }
    }

    /// Write an assembled frame to the bus
    pub fn send(&mut self, frame: &RawFrame) -> Result<()> {
        self.source.send(frame)
    }

    /// Release the line source; safe to call repeatedly
    pub fn close(&mut self) {
        self.source.close();
    }

    /// Check if the line source is still open
    pub fn is_open(&self) -> bool {
        self.source.is_open()
    }

    /// Catalogs used for resolution
    pub fn catalogs(&self) -> &Arc<CatalogSet> {
        &self.catalogs
    }

    /// Get transport type
    pub fn transport_type(&self) -> TransportType {
        self.source.transport_type()
    }

    /// Get connection info string
    pub fn connection_info(&self) -> String {
        self.source.connection_info()
    }

    /// Get statistics
    pub fn stats(&self) -> TransportStats {
        self.source.stats()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.source.close();
    }
}

/// Open a live or replay transport
pub fn open_transport(kind: TransportKind, catalogs: Arc<CatalogSet>) -> Result<Transport> {
    let source = create_transport(kind)?;
    tracing::debug!("Opened {} transport: {}", source.transport_type(), source.connection_info());
    Ok(Transport::new(source, catalogs))
}

/// Assemble an outbound frame, rejecting writes to read-only registers
pub fn build_command(
    address: u16,
    action: Action,
    register: u16,
    value: &Value,
    catalog: &Catalog,
) -> Result<RawFrame> {
    build(address, action, register, value, catalog, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::core::protocol::Payload;
    use std::io::Cursor;

    fn catalogs() -> Arc<CatalogSet> {
        CatalogSet::builtin().unwrap()
    }

    fn over(bytes: &[u8]) -> Transport {
        let source = LiveTransport::from_stream(
            "test",
            Cursor::new(bytes.to_vec()),
            crate::core::protocol::DEFAULT_MAX_LINE_LEN,
        );
        Transport::new(Box::new(source), catalogs())
    }

    #[test]
    fn test_mapped_address_is_decoded() {
        let mut transport = over(b"0011000106111111015\r");
        let devices = DeviceMap::new().with_device(1, "TC110").unwrap();

        let message = transport.next_message(&devices).unwrap();
        let decoded = message.decoded().unwrap();
        assert_eq!(decoded.label(), "Heating");
        assert_eq!(decoded.payload, Payload::Value(Value::Bool(true)));
    }

    #[test]
    fn test_unmapped_address_stays_raw() {
        let mut transport = over(b"0011000106111111015\r");
        let message = transport.next_message(&DeviceMap::new()).unwrap();
        assert!(matches!(message, Message::Raw(ref raw) if raw.param == 1));
        assert_eq!(message.raw().payload_raw, "111111");
    }

    #[test]
    fn test_unknown_catalog_in_map() {
        let mut transport = over(b"0011000106111111015\r");
        let devices = DeviceMap::new().with_device(1, "NOPE").unwrap();
        assert!(matches!(
            transport.next_message(&devices),
            Err(Error::UnknownCatalog(_))
        ));
        assert!(matches!(
            devices.validate(&catalogs()),
            Err(Error::UnknownCatalog(ref name)) if name == "NOPE"
        ));
    }

    #[test]
    fn test_device_address_bounds() {
        let mut devices = DeviceMap::new();
        assert!(devices.insert(999, "TC110").is_ok());
        assert!(devices.insert(1000, "TC110").unwrap_err().is_protocol_violation());
        assert_eq!(devices.len(), 1);
    }

    #[test]
    fn test_violation_then_next_frame() {
        let mut transport = over(b"0011000106111111016\r0010000102=?096\r");
        let devices = DeviceMap::new().with_device(1, "TC110").unwrap();

        assert!(transport.next_message(&devices).unwrap_err().is_protocol_violation());
        let message = transport.next_message(&devices).unwrap();
        assert_eq!(message.decoded().unwrap().payload, Payload::NotApplicable);
    }

    #[test]
    fn test_line_kept_when_interpretation_fails() {
        let mut transport = over(b"0011000106111111016\r0011099906000000035\r");
        let devices = DeviceMap::new().with_device(1, "TC110").unwrap();

        let corrupt = transport.next_line().unwrap();
        assert_eq!(corrupt, "0011000106111111016\r");
        assert!(transport.interpret(&corrupt, &devices).unwrap_err().is_protocol_violation());

        let unknown = transport.next_line().unwrap();
        assert!(matches!(
            transport.interpret(&unknown, &devices),
            Err(Error::UnknownRegister { register: 999, .. })
        ));
        assert!(transport.interpret(&unknown, &DeviceMap::new()).is_ok());
    }

    #[test]
    fn test_send_and_close() {
        let mut transport = over(b"");
        let catalogs = catalogs();
        let frame = build_command(
            1,
            Action::SetOrReply,
            1,
            &Value::Bool(true),
            catalogs.catalog("TC110").unwrap(),
        )
        .unwrap();
        assert_eq!(frame.as_str(), "0011000106111111015\r");

        transport.send(&frame).unwrap();
        assert_eq!(transport.stats().frames_sent, 1);
        transport.close();
        transport.close();
        assert!(!transport.is_open());
    }

    #[test]
    fn test_build_command_rejects_read_only() {
        let catalogs = catalogs();
        let err = build_command(
            1,
            Action::SetOrReply,
            309,
            &Value::Integer(633),
            catalogs.catalog("TC110").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolViolation(Violation::NotWritable { register: 309 })
        ));
    }
}
