//! Driver contract.
//!
//! This module defines:
//! - [`Phi`] / [`PhiBase`] - physical hardware interface drivers and their shared behavior
//! - [`Lpi`] / [`LpiBase`] - logical protocol interface drivers
//! - [`DriverModule`] - static module metadata and help schemas
//! - [`DeclaredCapabilities`] - capability model
//! - [`DriverError`] - error types for driver operations
//! - [`HostContext`] - core services offered to drivers
//! - [`EventSink`] - destination of hardware-originated state changes

pub mod capability;
pub mod error;
pub mod host;
pub mod lpi;
pub mod module;
pub mod namespace;
pub mod params;
pub mod phi;
pub mod update;

pub use capability::{Capability, CapabilityFlags, DeclaredCapabilities};
pub use error::{DriverError, DriverKind};
pub use host::{CriticalHook, HostContext};
pub use lpi::{Lpi, LpiBase, LpiInit};
pub use module::{DriverModule, HelpEntry, HelpKind};
pub use namespace::{SharedNamespace, SharedNamespaces};
pub use phi::{Phi, PhiBase, PhiInit};
pub use update::{UpdatePipeline, WakeSignal, compute_delta};

use serde_json::Value;

/// Port → value mapping exchanged between drivers and items.
pub type StateMap = serde_json::Map<String, Value>;

/// Destination of hardware-originated state changes.
///
/// The controller implements this to route events to subscribed items.
pub trait EventSink: Send + Sync {
    /// Called when `phi_id` observed new state on `port`.
    fn handle_phi_event(&self, phi_id: &str, port: &str, data: &StateMap);
}

/// Event sink discarding everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn handle_phi_event(&self, _phi_id: &str, _port: &str, _data: &StateMap) {}
}

/// Port argument of [`Phi::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// One port; data is a single value.
    Single(String),
    /// Several ports; data is an array of the same length.
    Multi(Vec<String>),
}

impl PortSpec {
    /// Ports addressed by this selector.
    pub fn ports(&self) -> Vec<&str> {
        match self {
            PortSpec::Single(p) => vec![p.as_str()],
            PortSpec::Multi(ps) => ps.iter().map(String::as_str).collect(),
        }
    }

    /// Pair every port with its value from `data`.
    ///
    /// Returns `None` when a multi-port selector does not get an array of
    /// matching length.
    pub fn pair<'a>(&'a self, data: &'a Value) -> Option<Vec<(&'a str, &'a Value)>> {
        match self {
            PortSpec::Single(p) => Some(vec![(p.as_str(), data)]),
            PortSpec::Multi(ps) => {
                let values = data.as_array()?;
                if values.len() != ps.len() {
                    return None;
                }
                Some(ps.iter().map(String::as_str).zip(values.iter()).collect())
            }
        }
    }
}

impl From<&str> for PortSpec {
    fn from(port: &str) -> Self {
        PortSpec::Single(port.to_string())
    }
}

impl From<Vec<&str>> for PortSpec {
    fn from(ports: Vec<&str>) -> Self {
        PortSpec::Multi(ports.into_iter().map(str::to_string).collect())
    }
}
