//! Driver capability model.
//!
//! Modules declare two lists of capability names: `features` (what the driver
//! provides) and `required` (what an item bound to it must be able to use).
//! Both lists are normalized and turned into fixed boolean records. Names
//! outside the known set are logged and ignored so that a module written for
//! a newer host still loads.

use crate::driver::error::DriverError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Known capability names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Get all ports in one call.
    AaoGet,
    /// Set multiple ports in one call.
    AaoSet,
    /// Driver executes unit actions.
    Action,
    /// Driver caches equipment state.
    Cache,
    /// Driver publishes hardware events.
    Events,
    /// Per-port reads.
    PortGet,
    /// Per-port writes.
    PortSet,
    /// Item status is driven.
    Status,
    /// Driver is not bound to a fixed equipment type.
    Universal,
    /// Item value is driven.
    Value,
}

impl Capability {
    /// Every known capability, in name order.
    pub const ALL: [Capability; 10] = [
        Capability::AaoGet,
        Capability::AaoSet,
        Capability::Action,
        Capability::Cache,
        Capability::Events,
        Capability::PortGet,
        Capability::PortSet,
        Capability::Status,
        Capability::Universal,
        Capability::Value,
    ];

    /// Capability name as used in module declarations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::AaoGet => "aao_get",
            Capability::AaoSet => "aao_set",
            Capability::Action => "action",
            Capability::Cache => "cache",
            Capability::Events => "events",
            Capability::PortGet => "port_get",
            Capability::PortSet => "port_set",
            Capability::Status => "status",
            Capability::Universal => "universal",
            Capability::Value => "value",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DriverError::UnknownCapability(s.to_string()))
    }
}

/// One boolean per known capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityFlags {
    pub aao_get: bool,
    pub aao_set: bool,
    pub action: bool,
    pub cache: bool,
    pub events: bool,
    pub port_get: bool,
    pub port_set: bool,
    pub status: bool,
    pub universal: bool,
    pub value: bool,
}

impl CapabilityFlags {
    /// Raise the flag for `cap`.
    pub fn set(&mut self, cap: Capability) {
        *self.flag_mut(cap) = true;
    }

    /// Whether the flag for `cap` is raised.
    pub fn contains(&self, cap: Capability) -> bool {
        match cap {
            Capability::AaoGet => self.aao_get,
            Capability::AaoSet => self.aao_set,
            Capability::Action => self.action,
            Capability::Cache => self.cache,
            Capability::Events => self.events,
            Capability::PortGet => self.port_get,
            Capability::PortSet => self.port_set,
            Capability::Status => self.status,
            Capability::Universal => self.universal,
            Capability::Value => self.value,
        }
    }

    fn flag_mut(&mut self, cap: Capability) -> &mut bool {
        match cap {
            Capability::AaoGet => &mut self.aao_get,
            Capability::AaoSet => &mut self.aao_set,
            Capability::Action => &mut self.action,
            Capability::Cache => &mut self.cache,
            Capability::Events => &mut self.events,
            Capability::PortGet => &mut self.port_get,
            Capability::PortSet => &mut self.port_set,
            Capability::Status => &mut self.status,
            Capability::Universal => &mut self.universal,
            Capability::Value => &mut self.value,
        }
    }
}

/// Normalized capability declaration of a driver instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredCapabilities {
    features: Vec<String>,
    required: Vec<String>,
    has_feature: CapabilityFlags,
    is_required: CapabilityFlags,
}

impl DeclaredCapabilities {
    /// Normalize declared lists.
    ///
    /// Both lists end up sorted and deduplicated; every required name is
    /// also a feature. `owner` only names the driver in log lines.
    pub fn from_declared(owner: &str, features: &[&str], required: &[&str]) -> Self {
        let mut required: Vec<String> = required.iter().map(|s| s.to_string()).collect();
        required.sort();
        required.dedup();

        let mut features: Vec<String> = features.iter().map(|s| s.to_string()).collect();
        features.extend(required.iter().cloned());
        features.sort();
        features.dedup();

        // Required names are a subset of the features, so one pass reports
        // every unknown name exactly once.
        let (has_feature, unknown) = flags_from(&features);
        for name in &unknown {
            warn!("{owner}: feature unknown: {name}");
        }
        let (is_required, _) = flags_from(&required);

        Self {
            features,
            required,
            has_feature,
            is_required,
        }
    }

    /// Sorted feature names (required names included).
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Sorted required names.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Provided capability flags.
    pub fn has_feature(&self) -> &CapabilityFlags {
        &self.has_feature
    }

    /// Required capability flags.
    pub fn is_required(&self) -> &CapabilityFlags {
        &self.is_required
    }

    /// Whether the declared feature list contains `name` (known or not).
    pub fn declares(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }

    /// Declared names outside the known capability set.
    pub fn unknown(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|f| f.parse::<Capability>().is_err())
            .map(String::as_str)
            .collect()
    }
}

fn flags_from(names: &[String]) -> (CapabilityFlags, Vec<&str>) {
    let mut flags = CapabilityFlags::default();
    let mut unknown = Vec::new();
    for name in names {
        match name.parse::<Capability>() {
            Ok(cap) => flags.set(cap),
            Err(_) => unknown.push(name.as_str()),
        }
    }
    (flags, unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_names_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
        assert!(matches!(
            "teleport".parse::<Capability>(),
            Err(DriverError::UnknownCapability(_))
        ));
    }

    #[test]
    fn test_required_implies_feature() {
        let caps =
            DeclaredCapabilities::from_declared("test", &["port_set", "aao_get"], &["value", "port_get"]);
        assert_eq!(caps.features(), &["aao_get", "port_get", "port_set", "value"]);
        assert_eq!(caps.required(), &["port_get", "value"]);
        assert!(caps.has_feature().value);
        assert!(caps.has_feature().port_get);
        assert!(caps.is_required().value);
        assert!(!caps.is_required().aao_get);
        assert!(!caps.has_feature().cache);
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let caps = DeclaredCapabilities::from_declared("test", &["events", "warp_drive"], &[]);
        assert!(caps.has_feature().events);
        assert!(caps.declares("warp_drive"));
        let mut expected = CapabilityFlags::default();
        expected.set(Capability::Events);
        assert_eq!(*caps.has_feature(), expected);
    }

    #[test]
    fn test_duplicates_collapse() {
        let caps = DeclaredCapabilities::from_declared("test", &["cache", "cache"], &["cache"]);
        assert_eq!(caps.features(), &["cache"]);
        assert!(caps.has_feature().contains(Capability::Cache));
        assert!(caps.is_required().contains(Capability::Cache));
    }

    #[test]
    fn test_unknown_required_name_reported_once() {
        let caps =
            DeclaredCapabilities::from_declared("test", &["warp_drive", "value"], &["warp_drive"]);
        assert_eq!(caps.unknown(), vec!["warp_drive"]);
        assert!(caps.has_feature().value);
        assert_eq!(*caps.is_required(), CapabilityFlags::default());
    }
}
