//! Payload datatypes
//!
//! Each register carries its value in one of twelve ASCII encodings. Decoding
//! is supported for all of them except the reserved one; encoding only for the
//! three types the controllers accept in outbound commands.

use crate::core::error::Violation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload datatype identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    /// Six characters, all `1` or all `0`
    #[serde(rename = "bool_old")]
    BoolOld,
    /// Six decimal digits
    #[serde(rename = "u_integer")]
    UInteger,
    /// Six decimal digits in hundredths
    #[serde(rename = "u_real")]
    UReal,
    /// Six characters holding a floating point literal
    #[serde(rename = "u_expo")]
    UExpo,
    /// Printable ASCII of any length
    #[serde(rename = "u_string")]
    UString,
    /// Reserved identifier without a decoder
    #[serde(rename = "reserved_5")]
    Reserved5,
    /// One character, `1` or `0`
    #[serde(rename = "bool_new")]
    BoolNew,
    /// Three decimal digits
    #[serde(rename = "u_short_int")]
    UShortInt,
    /// Three-character boolean followed by a three-digit temperature
    #[serde(rename = "tms_old")]
    TmsOld,
    /// Four-digit mantissa in thousandths and two-digit exponent
    #[serde(rename = "u_expo_new")]
    UExpoNew,
    /// Exactly sixteen printable characters
    #[serde(rename = "string16")]
    String16,
    /// Exactly eight printable characters
    #[serde(rename = "string8")]
    String8,
}

impl Datatype {
    /// Get all datatypes
    pub fn all() -> &'static [Datatype] {
        &[
            Datatype::BoolOld,
            Datatype::UInteger,
            Datatype::UReal,
            Datatype::UExpo,
            Datatype::UString,
            Datatype::Reserved5,
            Datatype::BoolNew,
            Datatype::UShortInt,
            Datatype::TmsOld,
            Datatype::UExpoNew,
            Datatype::String16,
            Datatype::String8,
        ]
    }

    /// Numeric identifier used in the controller documentation
    pub fn id(self) -> u8 {
        match self {
            Datatype::BoolOld => 0,
            Datatype::UInteger => 1,
            Datatype::UReal => 2,
            Datatype::UExpo => 3,
            Datatype::UString => 4,
            Datatype::Reserved5 => 5,
            Datatype::BoolNew => 6,
            Datatype::UShortInt => 7,
            Datatype::TmsOld => 9,
            Datatype::UExpoNew => 10,
            Datatype::String16 => 11,
            Datatype::String8 => 12,
        }
    }

    /// Datatype for a numeric identifier
    pub fn from_id(id: u8) -> Result<Self, Violation> {
        Self::all()
            .iter()
            .copied()
            .find(|dt| dt.id() == id)
            .ok_or(Violation::UnsupportedDatatype(id))
    }

    /// Get name of datatype
    pub fn name(self) -> &'static str {
        match self {
            Datatype::BoolOld => "bool_old",
            Datatype::UInteger => "u_integer",
            Datatype::UReal => "u_real",
            Datatype::UExpo => "u_expo",
            Datatype::UString => "u_string",
            Datatype::Reserved5 => "reserved_5",
            Datatype::BoolNew => "bool_new",
            Datatype::UShortInt => "u_short_int",
            Datatype::TmsOld => "tms_old",
            Datatype::UExpoNew => "u_expo_new",
            Datatype::String16 => "string16",
            Datatype::String8 => "string8",
        }
    }

    /// Fixed payload width, `None` for variable-length types
    pub fn width(self) -> Option<usize> {
        match self {
            Datatype::BoolOld
            | Datatype::UInteger
            | Datatype::UReal
            | Datatype::UExpo
            | Datatype::TmsOld
            | Datatype::UExpoNew => Some(6),
            Datatype::BoolNew => Some(1),
            Datatype::UShortInt => Some(3),
            Datatype::String16 => Some(16),
            Datatype::String8 => Some(8),
            Datatype::UString | Datatype::Reserved5 => None,
        }
    }

    /// Whether outbound commands can carry this datatype
    pub fn is_encodable(self) -> bool {
        matches!(self, Datatype::BoolOld | Datatype::UInteger | Datatype::UReal)
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl std::str::FromStr for Datatype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|dt| dt.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown datatype '{}'", s))
    }
}

/// A typed register value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Integer
    Integer(i64),
    /// Floating point
    Real(f64),
    /// Temperature management status
    Tms {
        /// Temperature management on/off
        on: bool,
        /// Reported temperature
        temperature: i32,
    },
    /// Text
    Text(String),
}

impl Value {
    /// Numeric view used for bound checks; booleans count as 0 and 1
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Integer(n) => Some(*n as f64),
            Value::Real(r) => Some(*r),
            Value::Tms { .. } | Value::Text(_) => None,
        }
    }

    /// Integer view for discrete values
    pub fn as_discrete(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(r) => write!(f, "{}", r),
            Value::Tms { on, temperature } => {
                write!(f, "{} ({})", if *on { "on" } else { "off" }, temperature)
            }
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

// ============ Decoding ============

fn invalid(datatype: Datatype, payload: &str, reason: impl Into<String>) -> Violation {
    Violation::InvalidPayload {
        datatype,
        payload: payload.to_string(),
        reason: reason.into(),
    }
}

fn check_width(datatype: Datatype, payload: &str) -> Result<(), Violation> {
    match datatype.width() {
        Some(width) if payload.len() != width => Err(invalid(
            datatype,
            payload,
            format!("has to be {} characters long", width),
        )),
        _ => Ok(()),
    }
}

fn check_digits(datatype: Datatype, payload: &str) -> Result<(), Violation> {
    if payload.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(invalid(datatype, payload, "non-digit character"))
    }
}

fn check_printable(datatype: Datatype, payload: &str) -> Result<(), Violation> {
    if payload.chars().all(|c| c.is_ascii() && c >= ' ') {
        Ok(())
    } else {
        Err(invalid(datatype, payload, "non-printable character"))
    }
}

fn parse_digits(datatype: Datatype, payload: &str) -> Result<i64, Violation> {
    check_digits(datatype, payload)?;
    payload
        .parse::<i64>()
        .map_err(|e| invalid(datatype, payload, e.to_string()))
}

fn parse_int_field(datatype: Datatype, payload: &str, field: &str) -> Result<i32, Violation> {
    field
        .trim()
        .parse::<i32>()
        .map_err(|_| invalid(datatype, payload, format!("{:?} is not an integer", field)))
}

/// Decode a payload into a typed value
pub fn decode(datatype: Datatype, payload: &str) -> Result<Value, Violation> {
    check_width(datatype, payload)?;

    match datatype {
        Datatype::BoolOld => match payload {
            "111111" => Ok(Value::Bool(true)),
            "000000" => Ok(Value::Bool(false)),
            _ => Err(invalid(datatype, payload, "unknown boolean value")),
        },
        Datatype::UInteger | Datatype::UShortInt => {
            parse_digits(datatype, payload).map(Value::Integer)
        }
        Datatype::UReal => {
            parse_digits(datatype, payload).map(|n| Value::Real(n as f64 / 100.0))
        }
        Datatype::UExpo => {
            let num = payload
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(datatype, payload, "invalid number"))?;
            if !num.is_finite() {
                return Err(invalid(datatype, payload, "number is not finite"));
            }
            Ok(Value::Real(num))
        }
        Datatype::UString | Datatype::String16 | Datatype::String8 => {
            check_printable(datatype, payload)?;
            Ok(Value::Text(payload.to_string()))
        }
        Datatype::Reserved5 => Err(invalid(datatype, payload, "no decoder for reserved datatype")),
        Datatype::BoolNew => match payload {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            _ => Err(invalid(datatype, payload, "unknown boolean value")),
        },
        Datatype::TmsOld => {
            let on = match payload.get(..3) {
                Some("111") => true,
                Some("000") => false,
                _ => return Err(invalid(datatype, payload, "invalid on/off field")),
            };
            let temperature = parse_int_field(datatype, payload, &payload[3..])?;
            Ok(Value::Tms { on, temperature })
        }
        Datatype::UExpoNew => {
            let (mantissa, exponent) = match (payload.get(..4), payload.get(4..)) {
                (Some(m), Some(e)) => (m, e),
                _ => return Err(invalid(datatype, payload, "invalid mantissa or exponent")),
            };
            let mantissa = parse_int_field(datatype, payload, mantissa)?;
            let exponent = parse_int_field(datatype, payload, exponent)?;
            Ok(Value::Real(f64::from(mantissa) / 1000.0 * 10f64.powi(exponent)))
        }
    }
}

/// Decode by numeric datatype identifier
pub fn decode_id(id: u8, payload: &str) -> Result<Value, Violation> {
    decode(Datatype::from_id(id)?, payload)
}

// ============ Encoding ============

const MAX_SIX_DIGITS: i64 = 999_999;

fn reject(datatype: Datatype, value: &Value, reason: impl Into<String>) -> Violation {
    Violation::InvalidValue {
        datatype,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn six_digits(datatype: Datatype, value: &Value, n: i64) -> Result<String, Violation> {
    if n < 0 {
        return Err(reject(datatype, value, "negative values have no wire representation"));
    }
    if n > MAX_SIX_DIGITS {
        return Err(reject(datatype, value, "does not fit in six digits"));
    }
    Ok(format!("{:06}", n))
}

/// Encode a typed value into its payload representation
pub fn encode(datatype: Datatype, value: &Value) -> Result<String, Violation> {
    match datatype {
        Datatype::BoolOld => match value {
            Value::Bool(true) => Ok("111111".to_string()),
            Value::Bool(false) => Ok("000000".to_string()),
            _ => Err(reject(datatype, value, "expected a boolean")),
        },
        Datatype::UInteger => match value {
            Value::Integer(n) => six_digits(datatype, value, *n),
            _ => Err(reject(datatype, value, "expected an integer")),
        },
        Datatype::UReal => {
            let real = match value {
                Value::Integer(n) => *n as f64,
                Value::Real(r) if r.is_finite() => *r,
                _ => return Err(reject(datatype, value, "expected a finite number")),
            };
            if real < 0.0 {
                return Err(reject(datatype, value, "negative values have no wire representation"));
            }
            let hundredths = (real * 100.0).round();
            if hundredths > MAX_SIX_DIGITS as f64 {
                return Err(reject(datatype, value, "does not fit in six digits"));
            }
            six_digits(datatype, value, hundredths as i64)
        }
        Datatype::UExpo
        | Datatype::UString
        | Datatype::Reserved5
        | Datatype::BoolNew
        | Datatype::UShortInt
        | Datatype::TmsOld
        | Datatype::UExpoNew
        | Datatype::String16
        | Datatype::String8 => Err(Violation::EncodingUnsupported(datatype)),
    }
}

/// Encode by numeric datatype identifier
pub fn encode_id(id: u8, value: &Value) -> Result<String, Violation> {
    encode(Datatype::from_id(id)?, value)
}
