//! Engine settings

use crate::core::catalog::CatalogSet;
use crate::core::error::{Error, Result};
use crate::core::protocol::{DEFAULT_MAX_LINE_LEN, MIN_FRAME_LEN};
use crate::core::transport::{DeviceMap, ReplayConfig, SerialConfig, TransportKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Serial device path
    pub port: String,
    /// Trace file; replaces the live port when set
    pub trace: Option<PathBuf>,
    /// Log every replayed frame at info level
    pub announce_replay: bool,
    /// Framer limit on bytes buffered without a terminator
    pub max_line_length: usize,
    /// Catalog file replacing the built-in catalogs
    pub catalog_file: Option<PathBuf>,
    /// Device address (as a string key) to catalog name
    pub devices: BTreeMap<String, String>,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyU0".to_string(),
            trace: None,
            announce_replay: false,
            max_line_length: DEFAULT_MAX_LINE_LEN,
            catalog_file: None,
            devices: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load `config.toml` from the platform config directory, or defaults
    pub fn load_default() -> Result<Self> {
        match super::config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values the type system cannot
    pub fn validate(&self) -> Result<()> {
        if self.max_line_length < MIN_FRAME_LEN {
            return Err(Error::Config(format!(
                "max_line_length {} is shorter than a frame ({})",
                self.max_line_length, MIN_FRAME_LEN
            )));
        }
        if self.port.is_empty() && self.trace.is_none() {
            return Err(Error::Config("either port or trace must be set".to_string()));
        }
        self.device_map()?;
        self.logging.validate()
    }

    /// Transport selected by this config
    pub fn transport_kind(&self) -> TransportKind {
        match &self.trace {
            Some(trace) => {
                TransportKind::Replay(ReplayConfig::new(trace).announce(self.announce_replay))
            }
            None => TransportKind::Live(
                SerialConfig::new(&self.port).max_line_length(self.max_line_length),
            ),
        }
    }

    /// Parsed device map
    pub fn device_map(&self) -> Result<DeviceMap> {
        let mut map = DeviceMap::new();
        for (key, catalog) in &self.devices {
            let address: u16 = key
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("device address {:?} is not a number", key)))?;
            map.insert(address, catalog.as_str())
                .map_err(|_| Error::Config(format!("device address {} exceeds 999", address)))?;
        }
        Ok(map)
    }

    /// Catalog set named by `catalog_file`, or the built-in one
    pub fn catalogs(&self) -> Result<Arc<CatalogSet>> {
        match &self.catalog_file {
            Some(path) => CatalogSet::load(path),
            None => CatalogSet::builtin(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level filter; `RUST_LOG` takes precedence
    pub level: String,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        self.level
            .parse::<tracing::Level>()
            .map(|_| ())
            .map_err(|_| Error::Config(format!("unknown log level {:?}", self.level)))
    }
}
