//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::core::error::Error;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Port could not be opened or the byte source failed
    pub const COMMUNICATION_FAILED: u8 = 3;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Protocol violation
    pub const PROTOCOL_ERROR: u8 = 9;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Register not in the catalog
    pub const UNKNOWN_REGISTER: u8 = 12;

    /// Catalog missing or invalid
    pub const CATALOG_ERROR: u8 = 13;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for the user
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Stopped by the user
    pub fn cancelled() -> Self {
        Self::Error(ExitCodes::CANCELLED, "Interrupted".to_string())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&Error> for CliResult {
    fn from(err: &Error) -> Self {
        let code = match err {
            Error::ProtocolViolation(_) => ExitCodes::PROTOCOL_ERROR,
            Error::UnknownRegister { .. } => ExitCodes::UNKNOWN_REGISTER,
            Error::Communication(_) => ExitCodes::COMMUNICATION_FAILED,
            Error::SimulationComplete => ExitCodes::SUCCESS,
            Error::UnknownCatalog(_) | Error::Catalog(_) => ExitCodes::CATALOG_ERROR,
            Error::Config(_) => ExitCodes::CONFIG_ERROR,
            Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                ExitCodes::FILE_NOT_FOUND
            }
            Error::Io(_) => ExitCodes::ERROR,
        };

        if code == ExitCodes::SUCCESS {
            Self::success_with_message(err.to_string())
        } else {
            Self::Error(code, err.to_string())
        }
    }
}

impl From<Error> for CliResult {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Communication failed",
        6 => "File not found",
        8 => "Configuration error",
        9 => "Protocol violation",
        11 => "Operation cancelled",
        12 => "Unknown register",
        13 => "Catalog error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 6, 8, 9, 11, 12, 13] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
