//! Register catalogs
//!
//! A catalog describes every register of one controller type. Catalogs are
//! plain data: they are parsed once into an immutable [`CatalogSet`] and then
//! shared read-only between any number of ports.

use crate::core::error::{Error, Result};
use crate::core::protocol::{Datatype, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Catalog data shipped with the crate
const BUILTIN_CATALOGS: &str = include_str!("registers.toml");

/// Highest register number the three-digit field can carry
pub const MAX_REGISTER: u16 = 999;

/// Register access rights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Read only
    #[serde(rename = "r")]
    ReadOnly,
    /// Read and write
    #[serde(rename = "rw")]
    ReadWrite,
    /// Write only (commands)
    #[serde(rename = "w")]
    WriteOnly,
}

impl AccessMode {
    /// Whether commands may set this register
    pub fn is_writable(self) -> bool {
        matches!(self, AccessMode::ReadWrite | AccessMode::WriteOnly)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::ReadOnly => "R",
            Self::ReadWrite => "RW",
            Self::WriteOnly => "W",
        })
    }
}

/// Description of one register
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterDescriptor {
    /// Register number
    pub number: u16,
    /// Payload datatype
    pub datatype: Datatype,
    /// Access rights
    pub access: AccessMode,
    /// Short display label
    pub display: String,
    /// Long designation
    pub designation: String,
    /// Physical unit
    pub unit: Option<String>,
    /// Lower bound, `None` when unbounded
    pub min: Option<f64>,
    /// Upper bound, `None` when unbounded
    pub max: Option<f64>,
    /// Factory default
    pub default: Option<f64>,
    /// Retained across power cycles
    pub persistent: bool,
    /// Meanings of discrete values
    pub values: Option<BTreeMap<i64, String>>,
}

impl RegisterDescriptor {
    /// Human-readable meaning of a discrete value, if the register defines one
    pub fn describe(&self, value: &Value) -> Option<&str> {
        let key = value.as_discrete()?;
        self.values.as_ref()?.get(&key).map(String::as_str)
    }
}

/// Registers of one controller type
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    name: String,
    registers: BTreeMap<u16, Arc<RegisterDescriptor>>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate register numbers
    pub fn new(
        name: impl Into<String>,
        descriptors: impl IntoIterator<Item = RegisterDescriptor>,
    ) -> Result<Self> {
        let name = name.into();
        let mut registers = BTreeMap::new();
        for descriptor in descriptors {
            let number = descriptor.number;
            if number > MAX_REGISTER {
                return Err(Error::Catalog(format!(
                    "register {} in catalog {} exceeds {}",
                    number, name, MAX_REGISTER
                )));
            }
            if registers.insert(number, Arc::new(descriptor)).is_some() {
                return Err(Error::Catalog(format!(
                    "duplicate register {} in catalog {}",
                    number, name
                )));
            }
        }
        Ok(Self { name, registers })
    }

    /// Device-type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a register
    pub fn lookup(&self, register: u16) -> Result<&Arc<RegisterDescriptor>> {
        self.registers
            .get(&register)
            .ok_or_else(|| Error::unknown_register(&self.name, register))
    }

    /// Look up a register without producing an error
    pub fn get(&self, register: u16) -> Option<&Arc<RegisterDescriptor>> {
        self.registers.get(&register)
    }

    /// Iterate registers in ascending order
    pub fn registers(&self) -> impl Iterator<Item = &Arc<RegisterDescriptor>> {
        self.registers.values()
    }

    /// Number of registers
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// True if the catalog has no registers
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

/// All loaded catalogs, keyed by device-type name
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogSet {
    catalogs: HashMap<String, Catalog>,
}

impl CatalogSet {
    /// Build a set, rejecting duplicate catalog names
    pub fn new(catalogs: impl IntoIterator<Item = Catalog>) -> Result<Self> {
        let mut map = HashMap::new();
        for catalog in catalogs {
            let name = catalog.name.clone();
            if map.insert(name.clone(), catalog).is_some() {
                return Err(Error::Catalog(format!("duplicate catalog {}", name)));
            }
        }
        Ok(Self { catalogs: map })
    }

    /// The catalogs shipped with the crate
    pub fn builtin() -> Result<Arc<Self>> {
        Self::from_toml_str(BUILTIN_CATALOGS).map(Arc::new)
    }

    /// Load catalogs from a TOML file
    pub fn load(path: &Path) -> Result<Arc<Self>> {
        let content = std::fs::read_to_string(path)?;
        let set = Self::from_toml_str(&content)?;
        tracing::debug!(
            "Loaded {} catalogs from {}",
            set.catalogs.len(),
            path.display()
        );
        Ok(Arc::new(set))
    }

    /// Parse catalogs from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| Error::Catalog(e.to_string()))?;
        let catalogs = file
            .catalog
            .into_iter()
            .map(CatalogEntry::into_catalog)
            .collect::<Result<Vec<_>>>()?;
        Self::new(catalogs)
    }

    /// Look up a catalog by device-type name
    pub fn catalog(&self, name: &str) -> Result<&Catalog> {
        self.catalogs
            .get(name)
            .ok_or_else(|| Error::UnknownCatalog(name.to_string()))
    }

    /// Look up a register in a named catalog
    pub fn lookup(&self, catalog: &str, register: u16) -> Result<&Arc<RegisterDescriptor>> {
        self.catalog(catalog)?.lookup(register)
    }

    /// True if a catalog with this name is loaded
    pub fn contains(&self, name: &str) -> bool {
        self.catalogs.contains_key(name)
    }

    /// Catalog names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ============ File format ============

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogEntry {
    name: String,
    #[serde(default)]
    register: Vec<RegisterEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegisterEntry {
    number: u16,
    datatype: Datatype,
    access: AccessMode,
    display: String,
    designation: String,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    default: Option<f64>,
    #[serde(default)]
    persistent: bool,
    #[serde(default)]
    values: Option<BTreeMap<String, String>>,
}

impl CatalogEntry {
    fn into_catalog(self) -> Result<Catalog> {
        let name = self.name;
        let descriptors = self
            .register
            .into_iter()
            .map(|entry| entry.into_descriptor(&name))
            .collect::<Result<Vec<_>>>()?;
        Catalog::new(name, descriptors)
    }
}

impl RegisterEntry {
    fn into_descriptor(self, catalog: &str) -> Result<RegisterDescriptor> {
        let fail = |reason: String| {
            Error::Catalog(format!("{} register {}: {}", catalog, self.number, reason))
        };

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(fail(format!("minimum {} exceeds maximum {}", min, max)));
            }
        }

        let values = match self.values {
            Some(raw) => {
                let mut parsed = BTreeMap::new();
                for (key, meaning) in raw {
                    let key = key
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| fail(format!("value key {:?} is not an integer", key)))?;
                    parsed.insert(key, meaning);
                }
                Some(parsed)
            }
            None => None,
        };

        Ok(RegisterDescriptor {
            number: self.number,
            datatype: self.datatype,
            access: self.access,
            display: self.display,
            designation: self.designation,
            unit: self.unit,
            min: self.min,
            max: self.max,
            default: self.default,
            persistent: self.persistent,
            values,
        })
    }
}
