//! Core module containing the protocol engine
//!
//! This module provides:
//! - Datatype, packet and framing codecs for the ASCII RS-485 protocol
//! - Register catalogs for the supported controllers
//! - Live serial and trace replay transports
//! - The error taxonomy shared by all of the above

pub mod catalog;
pub mod error;
pub mod protocol;
pub mod transport;
