//! Output formatting and argument parsing for the command-line front end

use crate::core::catalog::{Catalog, RegisterDescriptor};
use crate::core::error::Error;
use crate::core::protocol::{Datatype, DecodedPacket, RawPacket, Value};
use crate::core::transport::Message;
use clap::ValueEnum;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Aligned human-readable columns
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

fn raw_text(raw: &RawPacket) -> String {
    format!(
        "{:03} {:<9} {:03} {}",
        raw.address, raw.action, raw.param, raw.payload_raw
    )
}

fn decoded_text(packet: &DecodedPacket) -> String {
    let mut out = format!(
        "{:03} {:<9} {:03} {:<12} {}",
        packet.address(),
        packet.action(),
        packet.param(),
        packet.label(),
        packet.payload
    );
    if packet.payload.value().is_some() {
        if let Some(unit) = packet.unit() {
            out.push(' ');
            out.push_str(unit);
        }
    }
    if let Some(meaning) = packet.meaning() {
        out.push_str(&format!(" ({})", meaning));
    }
    out
}

/// Render one received frame
pub fn format_message(message: &Message, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => match message {
            Message::Raw(raw) => raw_text(raw),
            Message::Decoded(packet) => decoded_text(packet),
        },
        OutputFormat::Json => serde_json::to_string(message)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string()),
    }
}

/// Render a per-frame failure
pub fn format_error(err: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("! {}", err),
        OutputFormat::Json => {
            let kind = match err {
                Error::ProtocolViolation(_) => "protocol_violation",
                Error::UnknownRegister { .. } => "unknown_register",
                Error::Communication(_) => "communication",
                Error::SimulationComplete => "simulation_complete",
                Error::UnknownCatalog(_) => "unknown_catalog",
                Error::Catalog(_) => "catalog",
                Error::Config(_) => "config",
                Error::Io(_) => "io",
            };
            serde_json::json!({ "error": kind, "message": err.to_string() }).to_string()
        }
    }
}

/// One catalog line per register
pub fn format_register(register: &RegisterDescriptor) -> String {
    let mut out = format!(
        "{:03} {:<12} {:<11} {:<2} {:<6} {}",
        register.number,
        register.display,
        register.datatype,
        register.access,
        register.unit.as_deref().unwrap_or("-"),
        register.designation
    );
    if let Some(values) = &register.values {
        let meanings: Vec<String> = values.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        out.push_str(&format!(" [{}]", meanings.join(", ")));
    }
    out
}

/// Full catalog listing
pub fn format_catalog(catalog: &Catalog, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut lines = vec![format!("{} ({} registers)", catalog.name(), catalog.len())];
            lines.extend(catalog.registers().map(|r| format_register(r)));
            lines.join("\n")
        }
        OutputFormat::Json => serde_json::to_string_pretty(catalog)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string()),
    }
}

/// Parse a command-line value for a register of `datatype`
pub fn parse_value(datatype: Datatype, text: &str) -> Result<Value, String> {
    let text = text.trim();
    match datatype {
        Datatype::BoolOld | Datatype::BoolNew => match text.to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Ok(Value::Bool(true)),
            "0" | "false" | "off" | "no" => Ok(Value::Bool(false)),
            _ => Err(format!("{:?} is not a boolean", text)),
        },
        Datatype::UReal | Datatype::UExpo | Datatype::UExpoNew => text
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| format!("{:?} is not a number", text)),
        Datatype::UString | Datatype::String16 | Datatype::String8 => {
            Ok(Value::Text(text.to_string()))
        }
        _ => text
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| format!("{:?} is not an integer", text)),
    }
}

/// Parse `ADDR=CATALOG`
pub fn parse_device(arg: &str) -> Result<(u16, String), String> {
    let (address, catalog) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected ADDR=CATALOG, got {:?}", arg))?;
    let address = address
        .trim()
        .parse::<u16>()
        .map_err(|_| format!("invalid device address {:?}", address))?;
    Ok((address, catalog.trim().to_string()))
}
