//! Error types for the RS-485 protocol engine
//!
//! Every failure is handed back to the immediate caller. The engine never
//! retries; reconnect and backoff policy belong to whoever drives it.

use crate::core::protocol::Datatype;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level engine error
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed frame, illegal byte, bad payload or rejected command
    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),

    /// A well-formed frame references a register missing from the catalog
    #[error("Unknown register {register} in catalog {catalog}")]
    UnknownRegister {
        /// Catalog the lookup ran against
        catalog: String,
        /// Register number from the frame or command
        register: u16,
    },

    /// The byte source ended or faulted before a complete frame arrived
    #[error("Communication error: {0}")]
    Communication(String),

    /// Expected end of a replayed trace
    #[error("Simulation complete")]
    SimulationComplete,

    /// No catalog with this device-type name has been loaded
    #[error("Unknown catalog: {0}")]
    UnknownCatalog(String),

    /// Catalog data rejected while loading
    #[error("Invalid catalog data: {0}")]
    Catalog(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a `Communication` error.
    pub fn communication(reason: impl Into<String>) -> Self {
        Self::Communication(reason.into())
    }

    /// Creates an `UnknownRegister` error.
    pub fn unknown_register(catalog: impl Into<String>, register: u16) -> Self {
        Self::UnknownRegister {
            catalog: catalog.into(),
            register,
        }
    }

    /// True for any protocol violation
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }

    /// True when the frame was valid but its register is not catalogued
    pub fn is_unknown_register(&self) -> bool {
        matches!(self, Self::UnknownRegister { .. })
    }

    /// True for the end-of-trace signal
    pub fn is_simulation_complete(&self) -> bool {
        matches!(self, Self::SimulationComplete)
    }

    /// The violation carried by this error, if any
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::ProtocolViolation(v) => Some(v),
            _ => None,
        }
    }
}

/// Which bound an out-of-range value crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    /// Lower bound
    Minimum,
    /// Upper bound
    Maximum,
}

impl std::fmt::Display for BoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minimum => write!(f, "minimum"),
            Self::Maximum => write!(f, "maximum"),
        }
    }
}

/// Concrete protocol violations
///
/// Each variant carries enough context (offending line, byte, payload,
/// register or value) to diagnose the fault without re-reading the bus.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Violation {
    /// Frame shorter than the fixed header plus checksum
    #[error("sentence too short ({length} < {minimum}): {line:?}")]
    TooShort {
        /// Received line
        line: String,
        /// Its length
        length: usize,
        /// Required minimum
        minimum: usize,
    },

    /// Frame not terminated by a carriage return
    #[error("sentence not ended with carriage return: {line:?}")]
    MissingTerminator {
        /// Received line
        line: String,
    },

    /// A fixed-width numeric header field holds non-digit characters
    #[error("invalid {field} field {value:?} in {line:?}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Field contents
        value: String,
        /// Received line
        line: String,
    },

    /// Action digit other than query (0) or set/reply (1)
    #[error("invalid action {action:?} in {line:?}")]
    InvalidAction {
        /// Action character
        action: char,
        /// Received line
        line: String,
    },

    /// Transmitted checksum disagrees with the computed one
    #[error("checksum invalid (computed {computed:03}, transmitted {transmitted:?}): {line:?}")]
    ChecksumMismatch {
        /// Checksum computed over the frame body
        computed: u8,
        /// Checksum field as received
        transmitted: String,
        /// Received line
        line: String,
    },

    /// Byte outside the printable range that is not the terminator
    #[error("illegal byte 0x{byte:02X} after {received:?}")]
    IllegalByte {
        /// Offending byte
        byte: u8,
        /// Bytes accepted before it
        received: String,
    },

    /// Line grew past the framer's buffer limit without a terminator
    #[error("line exceeds {limit} bytes without terminator: {received:?}")]
    LineTooLong {
        /// Configured limit
        limit: usize,
        /// Bytes buffered before the limit was hit
        received: String,
    },

    /// Payload does not match its datatype
    #[error("invalid {datatype} payload {payload:?}: {reason}")]
    InvalidPayload {
        /// Datatype the payload was decoded as
        datatype: Datatype,
        /// Offending payload
        payload: String,
        /// What was wrong with it
        reason: String,
    },

    /// Numeric datatype identifier outside the known set
    #[error("unsupported datatype {0}")]
    UnsupportedDatatype(u8),

    /// Datatype is decode-only
    #[error("datatype {0} is unsupported for encoding")]
    EncodingUnsupported(Datatype),

    /// Value cannot be represented in the datatype
    #[error("cannot encode {value} as {datatype}: {reason}")]
    InvalidValue {
        /// Target datatype
        datatype: Datatype,
        /// Offending value, rendered
        value: String,
        /// What was wrong with it
        reason: String,
    },

    /// Value outside the register's bounds
    #[error("register {register} has {bound} value of {limit} but {value} supplied")]
    OutOfRange {
        /// Register number
        register: u16,
        /// Which bound was crossed
        bound: BoundKind,
        /// The bound itself
        limit: f64,
        /// Offending value
        value: f64,
    },

    /// Write attempted on a read-only register
    #[error("register {register} is not writable")]
    NotWritable {
        /// Register number
        register: u16,
    },

    /// Address does not fit the three-digit field
    #[error("address {0} exceeds 999")]
    AddressOutOfRange(u16),

    /// Payload does not fit the two-digit length field
    #[error("payload of {0} characters exceeds 99")]
    PayloadTooLong(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_display() {
        let err = Error::from(Violation::ChecksumMismatch {
            computed: 15,
            transmitted: "016".to_string(),
            line: "0011000106111111016\r".to_string(),
        });
        assert!(err.is_protocol_violation());
        assert!(err.to_string().contains("checksum invalid"));
        assert!(err.to_string().contains("computed 015"));
    }

    #[test]
    fn test_unknown_register_is_distinct() {
        let err = Error::unknown_register("TC110", 999);
        assert!(err.is_unknown_register());
        assert!(!err.is_protocol_violation());
        assert_eq!(err.to_string(), "Unknown register 999 in catalog TC110");
    }

    #[test]
    fn test_out_of_range_display() {
        let err = Violation::OutOfRange {
            register: 700,
            bound: BoundKind::Maximum,
            limit: 120.0,
            value: 121.0,
        };
        assert_eq!(
            err.to_string(),
            "register 700 has maximum value of 120 but 121 supplied"
        );
    }

    #[test]
    fn test_simulation_complete_is_not_a_violation() {
        let err = Error::SimulationComplete;
        assert!(err.is_simulation_complete());
        assert!(err.violation().is_none());
    }
}
