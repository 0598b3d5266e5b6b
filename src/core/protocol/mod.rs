//! Protocol implementation
//!
//! Provides the codec layers of the controller protocol:
//! - Checksum (8-bit byte sum, three decimal digits)
//! - Payload datatypes
//! - Frame parsing, resolution and building
//! - Line framing over a byte stream

pub mod checksum;
pub mod datatype;
pub mod framing;
pub mod packet;

pub use datatype::{decode as decode_value, encode as encode_value, Datatype, Value};
pub use framing::{FramerState, LineFramer, DEFAULT_MAX_LINE_LEN};
pub use packet::{
    build, build_query, parse_raw, resolve, Action, DecodedPacket, Payload, RawFrame, RawPacket,
    MAX_ADDRESS, MIN_FRAME_LEN, QUERY_PAYLOAD,
};
