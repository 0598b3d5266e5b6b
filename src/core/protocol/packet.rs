//! Frame encoding and decoding
//!
//! Wire layout, all fields zero-padded decimal ASCII:
//!
//! ```text
//! AAA C R PPP LL <payload> SSS \r
//! |   | | |   |            |
//! |   | | |   |            +-- checksum: byte sum of everything before it, mod 256
//! |   | | |   +-- payload length
//! |   | | +-- register (parameter) number
//! |   | +-- reserved, documented as 0 but not reliably so on real buses
//! |   +-- action: 0 query, 1 set or reply
//! +-- device address
//! ```

use super::checksum;
use super::datatype::{self, Value};
use crate::core::catalog::{AccessMode, Catalog, RegisterDescriptor};
use crate::core::error::{BoundKind, Result, Violation};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Shortest possible frame: header, empty payload, checksum, terminator
pub const MIN_FRAME_LEN: usize = 14;

/// Frame terminator
pub const TERMINATOR: u8 = b'\r';

/// Payload carried by query frames
pub const QUERY_PAYLOAD: &str = "=?";

/// Highest address the three-digit field can carry
pub const MAX_ADDRESS: u16 = 999;

const HEADER_LEN: usize = 10;
const TRAILER_LEN: usize = checksum::CHECKSUM_WIDTH + 1;
const MAX_PAYLOAD_LEN: usize = 99;

/// Frame action code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read request (0)
    Query,
    /// Write command or controller reply (1)
    SetOrReply,
}

impl Action {
    /// Wire digit
    pub fn digit(self) -> u8 {
        match self {
            Action::Query => 0,
            Action::SetOrReply => 1,
        }
    }

    /// Action for a wire character
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Action::Query),
            '1' => Some(Action::SetOrReply),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Action::Query => "query",
            Action::SetOrReply => "set/reply",
        })
    }
}

/// A checksum-verified frame, fields sliced but payload not interpreted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawPacket {
    /// Device address
    pub address: u16,
    /// Action code
    pub action: Action,
    /// Register number
    pub param: u16,
    /// Payload as transmitted
    pub payload_raw: String,
    /// Payload length field as transmitted
    pub payload_length: u8,
    /// Complete frame including terminator
    pub packet_raw: String,
}

/// Typed payload of a resolved frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Queries carry no value
    NotApplicable,
    /// Decoded value
    Value(Value),
}

impl Payload {
    /// The decoded value, if any
    pub fn value(&self) -> Option<&Value> {
        match self {
            Payload::NotApplicable => None,
            Payload::Value(v) => Some(v),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::NotApplicable => f.write_str(QUERY_PAYLOAD),
            Payload::Value(v) => write!(f, "{}", v),
        }
    }
}

/// A frame resolved against a register catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedPacket {
    /// The underlying frame
    #[serde(flatten)]
    pub raw: RawPacket,
    /// Catalog the register was resolved in
    pub catalog: String,
    /// Register description
    pub register: Arc<RegisterDescriptor>,
    /// Typed payload
    pub payload: Payload,
}

impl DecodedPacket {
    /// Device address
    pub fn address(&self) -> u16 {
        self.raw.address
    }

    /// Action code
    pub fn action(&self) -> Action {
        self.raw.action
    }

    /// Register number
    pub fn param(&self) -> u16 {
        self.raw.param
    }

    /// Short display label
    pub fn label(&self) -> &str {
        &self.register.display
    }

    /// Long designation
    pub fn designation(&self) -> &str {
        &self.register.designation
    }

    /// Access rights
    pub fn access(&self) -> AccessMode {
        self.register.access
    }

    /// Physical unit
    pub fn unit(&self) -> Option<&str> {
        self.register.unit.as_deref()
    }

    /// Lower bound
    pub fn min(&self) -> Option<f64> {
        self.register.min
    }

    /// Upper bound
    pub fn max(&self) -> Option<f64> {
        self.register.max
    }

    /// Factory default
    pub fn default_value(&self) -> Option<f64> {
        self.register.default
    }

    /// Retained across power cycles
    pub fn persistent(&self) -> bool {
        self.register.persistent
    }

    /// Meaning of a discrete payload value
    pub fn meaning(&self) -> Option<&str> {
        self.payload.value().and_then(|v| self.register.describe(v))
    }
}

/// An assembled outbound frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RawFrame(String);

impl RawFrame {
    /// Frame text including checksum and terminator
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Frame bytes as written to the bus
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Take the frame text
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.trim_end_matches('\r'))
    }
}

impl AsRef<[u8]> for RawFrame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

// ============ Decoding ============

fn numeric_field(line: &str, field: &'static str, range: std::ops::Range<usize>) -> Result<u16> {
    let value = &line[range];
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Violation::InvalidField {
            field,
            value: value.to_string(),
            line: line.to_string(),
        }
        .into());
    }
    // At most three ASCII digits, cannot overflow
    Ok(value.bytes().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0')))
}

/// Validate a received line and slice it into its fields
///
/// Checks length, terminator and checksum before any field is interpreted.
/// The reserved byte at offset 4 is deliberately left unchecked.
pub fn parse_raw(line: &str) -> Result<RawPacket> {
    if let Some(pos) = line.bytes().position(|b| !b.is_ascii()) {
        return Err(Violation::IllegalByte {
            byte: line.as_bytes()[pos],
            received: line[..pos].to_string(),
        }
        .into());
    }
    if line.len() < MIN_FRAME_LEN {
        return Err(Violation::TooShort {
            line: line.to_string(),
            length: line.len(),
            minimum: MIN_FRAME_LEN,
        }
        .into());
    }
    if line.as_bytes()[line.len() - 1] != TERMINATOR {
        return Err(Violation::MissingTerminator {
            line: line.to_string(),
        }
        .into());
    }

    let checksum_start = line.len() - TRAILER_LEN;
    let body = &line[..checksum_start];
    let transmitted = &line[checksum_start..line.len() - 1];
    if !checksum::verify(body.as_bytes(), transmitted) {
        return Err(Violation::ChecksumMismatch {
            computed: checksum::sum8_checksum(body.as_bytes()),
            transmitted: transmitted.to_string(),
            line: line.to_string(),
        }
        .into());
    }

    let address = numeric_field(line, "address", 0..3)?;
    let action_char = char::from(line.as_bytes()[3]);
    let action = Action::from_char(action_char).ok_or_else(|| Violation::InvalidAction {
        action: action_char,
        line: line.to_string(),
    })?;
    let param = numeric_field(line, "register", 5..8)?;
    let payload_length = numeric_field(line, "payload length", 8..10)? as u8;

    Ok(RawPacket {
        address,
        action,
        param,
        payload_raw: line[HEADER_LEN..checksum_start].to_string(),
        payload_length,
        packet_raw: line.to_string(),
    })
}

/// Resolve a frame's register in a catalog and decode its payload
///
/// Replies and set commands are decoded with the register's datatype; query
/// payloads are reported as [`Payload::NotApplicable`]. A register missing
/// from the catalog yields `Error::UnknownRegister`.
pub fn resolve(raw: RawPacket, catalog: &Catalog) -> Result<DecodedPacket> {
    let register = Arc::clone(catalog.lookup(raw.param)?);

    let payload = match raw.action {
        Action::SetOrReply => Payload::Value(datatype::decode(register.datatype, &raw.payload_raw)?),
        Action::Query => Payload::NotApplicable,
    };

    tracing::trace!(
        address = raw.address,
        register = raw.param,
        label = %register.display,
        "resolved frame"
    );

    Ok(DecodedPacket {
        raw,
        catalog: catalog.name().to_string(),
        register,
        payload,
    })
}

// ============ Encoding ============

fn assemble(address: u16, action: Action, register: u16, payload: &str) -> Result<RawFrame> {
    if address > MAX_ADDRESS {
        return Err(Violation::AddressOutOfRange(address).into());
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Violation::PayloadTooLong(payload.len()).into());
    }

    let body = format!(
        "{:03}{}0{:03}{:02}{}",
        address,
        action.digit(),
        register,
        payload.len(),
        payload
    );
    let mut frame = checksum::stamp(&body);
    frame.push(char::from(TERMINATOR));
    Ok(RawFrame(frame))
}

fn check_bounds(register: &RegisterDescriptor, value: &Value) -> Result<()> {
    let Some(numeric) = value.as_f64() else {
        return Ok(());
    };
    if let Some(min) = register.min {
        if numeric < min {
            return Err(Violation::OutOfRange {
                register: register.number,
                bound: BoundKind::Minimum,
                limit: min,
                value: numeric,
            }
            .into());
        }
    }
    if let Some(max) = register.max {
        if numeric > max {
            return Err(Violation::OutOfRange {
                register: register.number,
                bound: BoundKind::Maximum,
                limit: max,
                value: numeric,
            }
            .into());
        }
    }
    Ok(())
}

/// Build an outbound frame carrying `value` for `register`
///
/// The value is range-checked against the register's bounds (booleans count
/// as 0 and 1). With `enforce_writable` the register must accept writes;
/// analysis tools that only reconstruct frames may turn that off.
pub fn build(
    address: u16,
    action: Action,
    register: u16,
    value: &Value,
    catalog: &Catalog,
    enforce_writable: bool,
) -> Result<RawFrame> {
    let descriptor = catalog.lookup(register)?;

    check_bounds(descriptor, value)?;
    if enforce_writable && !descriptor.access.is_writable() {
        return Err(Violation::NotWritable { register }.into());
    }

    let payload = datatype::encode(descriptor.datatype, value)?;
    assemble(address, action, register, &payload)
}

/// Build a query frame for `register`
pub fn build_query(address: u16, register: u16, catalog: &Catalog) -> Result<RawFrame> {
    catalog.lookup(register)?;
    assemble(address, Action::Query, register, QUERY_PAYLOAD)
}
