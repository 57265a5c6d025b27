//! Driver subsystem error types.

use std::fmt;
use thiserror::Error;

/// Kind of driver a module or instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// Physical hardware interface.
    Phi,
    /// Logical protocol interface.
    Lpi,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Phi => f.write_str("PHI"),
            DriverKind::Lpi => f.write_str("LPI"),
        }
    }
}

/// Error types for driver operations.
///
/// Every variant is logged where it is detected; the value returned to the
/// caller only carries enough context to name the failing driver or item.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// No module with this name is registered.
    #[error("{kind} module not found: {module}")]
    ModuleNotFound {
        /// Module kind.
        kind: DriverKind,
        /// Requested module name.
        module: String,
    },

    /// Module requires a newer driver API than the host provides.
    #[error("module {module} requires driver API {declared}, host supports {supported}")]
    ApiVersion {
        /// Module name.
        module: String,
        /// Declared API version.
        declared: u32,
        /// Host API version.
        supported: u32,
    },

    /// Module constructed an instance that is not ready.
    #[error("unable to init {kind} module {module}")]
    NotReady {
        /// Module kind.
        kind: DriverKind,
        /// Module name.
        module: String,
    },

    /// A module with the same name is already registered.
    #[error("{kind} module already registered: {module}")]
    DuplicateModule {
        /// Module kind.
        kind: DriverKind,
        /// Module name.
        module: String,
    },

    /// No PHI loaded under this id.
    #[error("unknown PHI: {0}")]
    UnknownPhi(String),

    /// No LPI loaded under this id or driver id.
    #[error("unknown LPI: {0}")]
    UnknownLpi(String),

    /// Item driver string is not of the form `|<phi_id>.<rest>`.
    #[error("invalid driver string for item {item}: {update_exec:?}")]
    InvalidUpdateSource {
        /// Item full id.
        item: String,
        /// Offending driver string.
        update_exec: Option<String>,
    },

    /// PHI unload refused.
    #[error("PHI {phi_id} is in use (LPIs: {lpis:?}, subscribed items: {items})")]
    PhiBusy {
        /// PHI id.
        phi_id: String,
        /// LPIs bound to the PHI.
        lpis: Vec<String>,
        /// Number of subscribed items.
        items: usize,
    },

    /// LPI unload refused.
    #[error("driver {driver_id} is in use by {items:?}")]
    LpiBusy {
        /// Composite driver id.
        driver_id: String,
        /// Items referencing the driver.
        items: Vec<String>,
    },

    /// Capability name outside the known set.
    #[error("feature unknown: {0}")]
    UnknownCapability(String),

    /// Driver instance failed to serialize.
    #[error("{id} serialize error: {reason}")]
    Serialize {
        /// Instance id.
        id: String,
        /// Failure description.
        reason: String,
    },

    /// Snapshot read/write error.
    #[error("driver snapshot error: {0}")]
    Persistence(String),

    /// Update pipeline thread could not be spawned.
    #[error("unable to spawn thread: {0}")]
    ThreadSpawn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::ModuleNotFound {
            kind: DriverKind::Phi,
            module: "nosuch".to_string(),
        };
        assert_eq!(err.to_string(), "PHI module not found: nosuch");

        let err = DriverError::ApiVersion {
            module: "future".to_string(),
            declared: 9,
            supported: 5,
        };
        assert!(err.to_string().contains("requires driver API 9"));

        let err = DriverError::PhiBusy {
            phi_id: "relay1".to_string(),
            lpis: vec!["basic".to_string()],
            items: 0,
        };
        assert!(err.to_string().contains("relay1"));
        assert!(err.to_string().contains("basic"));
    }

    #[test]
    fn test_driver_kind_display() {
        assert_eq!(DriverKind::Phi.to_string(), "PHI");
        assert_eq!(DriverKind::Lpi.to_string(), "LPI");
    }
}
