//! Static driver module metadata.
//!
//! Every built-in module exposes one `static` [`DriverModule`]. The metadata
//! is immutable for the life of a loaded instance; reloading a module
//! resolves it again from the registry.

use crate::driver::error::DriverError;
use serde::Serialize;
use serde_json::{Value, json};
use std::str::FromStr;

/// One entry of a configuration/get/set help schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HelpEntry {
    /// Parameter name.
    pub name: &'static str,
    /// Human readable description.
    pub help: &'static str,
    /// Value type (`int`, `float`, `str`, `bool`, ...).
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Whether the parameter must be given.
    pub required: bool,
}

/// Help schema selector for [`DriverModule::help`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpKind {
    /// Instance configuration keys.
    Cfg,
    /// `get()` parameters.
    Get,
    /// `set()` parameters.
    Set,
    /// Port description.
    Ports,
    /// Discovery description.
    Discover,
}

impl FromStr for HelpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cfg" => Ok(HelpKind::Cfg),
            "get" => Ok(HelpKind::Get),
            "set" => Ok(HelpKind::Set),
            "ports" => Ok(HelpKind::Ports),
            "discover" => Ok(HelpKind::Discover),
            other => Err(format!("unknown help kind: {other}")),
        }
    }
}

/// Declared metadata of a driver module.
#[derive(Debug, Clone, Copy)]
pub struct DriverModule {
    /// Module name, as used in `load_phi`/`load_lpi` and snapshots.
    pub id: &'static str,
    /// Driver API version the module is written against.
    pub api_version: u32,
    /// Module author.
    pub author: &'static str,
    /// License name.
    pub license: &'static str,
    /// Module version.
    pub version: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Supported equipment.
    pub equipment: &'static [&'static str],
    /// Capability names the driver provides.
    pub features: &'static [&'static str],
    /// Capability names an item bound to the driver must be able to use.
    pub required: &'static [&'static str],
    /// Other modules this one depends on.
    pub mods_required: &'static [&'static str],
    /// LPI module to pair with by default (PHI modules only).
    pub lpi_default: Option<&'static str>,
    /// Long help text.
    pub help: &'static str,
    /// Instance configuration keys.
    pub config_help: &'static [HelpEntry],
    /// Extra `get()` parameters.
    pub get_help: &'static [HelpEntry],
    /// Extra `set()` parameters.
    pub set_help: &'static [HelpEntry],
    /// Port description, e.g. `"1..16"`.
    pub ports_help: &'static str,
    /// Whether `get_ports()` is implemented.
    pub can_get_ports: bool,
    /// Interfaces the module can discover equipment on.
    pub discover: &'static [&'static str],
    /// Discovery description.
    pub discover_help: &'static str,
    /// Shared namespaces the module may request.
    pub shared_namespaces: &'static [&'static str],
}

impl DriverModule {
    /// Empty metadata, handy as a base for struct update syntax.
    pub const EMPTY: DriverModule = DriverModule {
        id: "",
        api_version: 1,
        author: "",
        license: "",
        version: "",
        description: "",
        equipment: &[],
        features: &[],
        required: &[],
        mods_required: &[],
        lpi_default: None,
        help: "",
        config_help: &[],
        get_help: &[],
        set_help: &[],
        ports_help: "",
        can_get_ports: false,
        discover: &[],
        discover_help: "",
        shared_namespaces: &[],
    };

    /// Whether the module declares `feature` (required names count as declared).
    pub fn declares(&self, feature: &str) -> bool {
        self.features.iter().chain(self.required).any(|f| *f == feature)
    }

    /// Render a help schema without a live instance.
    ///
    /// The `cfg` schema gains `cache` and `update` entries when the module
    /// declares the `cache` and `aao_get` features.
    pub fn help(&self, kind: HelpKind) -> Value {
        match kind {
            HelpKind::Cfg => {
                let mut entries: Vec<HelpEntry> = self.config_help.to_vec();
                if self.declares("cache") {
                    entries.push(HelpEntry {
                        name: "cache",
                        help: "caches state for N sec",
                        kind: "float",
                        required: false,
                    });
                }
                if self.declares("aao_get") {
                    entries.push(HelpEntry {
                        name: "update",
                        help: "send updates to items every N sec",
                        kind: "float",
                        required: false,
                    });
                }
                to_value(&entries)
            }
            HelpKind::Get => to_value(self.get_help),
            HelpKind::Set => to_value(self.set_help),
            HelpKind::Ports => Value::from(self.ports_help),
            HelpKind::Discover => Value::from(self.discover_help),
        }
    }

    /// Render a help schema by name; unknown names yield `Null`.
    pub fn help_by_name(&self, kind: &str) -> Value {
        kind.parse::<HelpKind>()
            .map(|k| self.help(k))
            .unwrap_or(Value::Null)
    }

    /// Static metadata part of a full serialization.
    pub fn info(&self) -> serde_json::Map<String, Value> {
        let can_discover = if self.discover.is_empty() {
            Value::Null
        } else {
            json!(self.discover)
        };
        let info = json!({
            "author": self.author,
            "license": self.license,
            "description": self.description,
            "version": self.version,
            "api": self.api_version,
            "can_discover": can_discover,
            "can_get_ports": self.can_get_ports,
            "lpi_default": self.lpi_default,
            "equipment": self.equipment,
            "mods_required": self.mods_required,
            "help": self.help,
        });
        match info {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Check the declared API version against `supported`.
    pub fn check_api(&self, supported: u32) -> Result<(), DriverError> {
        if self.api_version > supported {
            return Err(DriverError::ApiVersion {
                module: self.id.to_string(),
                declared: self.api_version,
                supported,
            });
        }
        Ok(())
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
