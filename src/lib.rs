//! # Pfeiffer RS-485 Core Library
//!
//! Protocol engine for the ASCII RS-485 protocol spoken by Pfeiffer vacuum
//! turbopump and valve controllers:
//! - Frame validation, decoding and assembly with 8-bit sum checksums
//! - Register catalogs (TC110, MVP015) with bounds and access checks
//! - Live serial transport (9600 baud, 8N1) and trace replay
//!
//! ## Example
//!
//! ```rust,no_run
//! use pfeiffer_core::{open_transport, CatalogSet, DeviceMap, Error, TransportKind};
//!
//! fn main() -> anyhow::Result<()> {
//!     let catalogs = CatalogSet::builtin()?;
//!     let devices = DeviceMap::new().with_device(1, "TC110")?;
//!     let mut transport = open_transport(TransportKind::live("/dev/ttyU0"), catalogs)?;
//!
//!     loop {
//!         match transport.next_message(&devices) {
//!             Ok(message) => println!("{:?}", message),
//!             Err(e) if e.is_protocol_violation() => eprintln!("{}", e),
//!             Err(Error::SimulationComplete) => break,
//!             Err(e) => return Err(e.into()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{EngineConfig, LoggingConfig};
pub use crate::core::catalog::{AccessMode, Catalog, CatalogSet, RegisterDescriptor};
pub use crate::core::error::{BoundKind, Error, Result, Violation};
pub use crate::core::protocol::{
    build, build_query, decode_value, encode_value, parse_raw, resolve, Action, Datatype,
    DecodedPacket, LineFramer, Payload, RawFrame, RawPacket, Value,
};
pub use crate::core::transport::{
    build_command, open_transport, DeviceMap, Message, Transport, TransportKind, TransportType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
