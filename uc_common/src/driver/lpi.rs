//! Logical protocol interface (LPI) drivers.
//!
//! An LPI translates raw PHI I/O into item-level semantics. It is bound to
//! exactly one PHI at load time and referenced by items through its driver
//! id `<phi_id>.<lpi_id>`. An LPI owns no threads; the PHI it is bound to is
//! passed in on every call.

use crate::driver::capability::DeclaredCapabilities;
use crate::driver::error::DriverError;
use crate::driver::host::HostContext;
use crate::driver::module::DriverModule;
use crate::driver::phi::Phi;
use crate::driver::StateMap;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::error;

/// Construction arguments handed to an LPI module factory.
#[derive(Debug, Clone)]
pub struct LpiInit {
    /// Registry id of the new instance.
    pub lpi_id: String,
    /// PHI the instance is bound to.
    pub phi_id: String,
    /// Instance configuration.
    pub config: StateMap,
    /// Host services.
    pub host: Arc<HostContext>,
}

/// Behavior shared by every LPI.
#[derive(Debug)]
pub struct LpiBase {
    module: &'static DriverModule,
    lpi_id: String,
    phi_id: String,
    driver_id: String,
    oid: String,
    config: StateMap,
    capabilities: DeclaredCapabilities,
    ready: AtomicBool,
    host: Arc<HostContext>,
}

impl LpiBase {
    /// Build the base from module metadata and construction arguments.
    pub fn new(module: &'static DriverModule, init: LpiInit) -> Self {
        let driver_id = format!("{}.{}", init.phi_id, init.lpi_id);
        let capabilities = DeclaredCapabilities::from_declared(
            &format!("LPI {driver_id}"),
            module.features,
            module.required,
        );
        Self {
            module,
            oid: format!("lpi:{driver_id}"),
            driver_id,
            lpi_id: init.lpi_id,
            phi_id: init.phi_id,
            config: init.config,
            capabilities,
            ready: AtomicBool::new(true),
            host: init.host,
        }
    }

    /// Module metadata.
    pub fn module(&self) -> &'static DriverModule {
        self.module
    }

    /// Registry id.
    pub fn lpi_id(&self) -> &str {
        &self.lpi_id
    }

    /// Id of the bound PHI.
    pub fn phi_id(&self) -> &str {
        &self.phi_id
    }

    /// Composite id `<phi_id>.<lpi_id>`, as referenced by items.
    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    /// Object id.
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Instance configuration.
    pub fn config(&self) -> &StateMap {
        &self.config
    }

    /// Normalized capability declaration.
    pub fn capabilities(&self) -> &DeclaredCapabilities {
        &self.capabilities
    }

    /// Host services.
    pub fn host(&self) -> &HostContext {
        &self.host
    }

    /// Whether the instance initialized successfully.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Mark the instance as failed to initialize. Logs `reason`.
    pub fn set_not_ready(&self, reason: &str) {
        error!("LPI {}: {reason}", self.driver_id);
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Introspection data, same levels as [`PhiBase::serialize`](crate::driver::PhiBase::serialize).
    pub fn serialize(&self, full: bool, config: bool, helpinfo: Option<&str>) -> Value {
        if let Some(kind) = helpinfo {
            return self.module.help_by_name(kind);
        }
        let mut d = StateMap::new();
        if full {
            d.extend(self.module.info());
            d.insert("oid".to_string(), Value::from(self.oid.as_str()));
            d.insert("features".to_string(), json!(self.capabilities.features()));
            d.insert("required".to_string(), json!(self.capabilities.required()));
        }
        if config {
            d.insert("cfg".to_string(), Value::Object(self.config.clone()));
        }
        d.insert("lpi_id".to_string(), Value::from(self.lpi_id.as_str()));
        d.insert("phi_id".to_string(), Value::from(self.phi_id.as_str()));
        d.insert("mod".to_string(), Value::from(self.module.id));
        d.insert("id".to_string(), Value::from(self.driver_id.as_str()));
        Value::Object(d)
    }
}

/// Interface every LPI implements.
pub trait Lpi: Send + Sync {
    /// Shared base behavior.
    fn base(&self) -> &LpiBase;

    /// Driver-specific start hook.
    fn start(&self) -> bool {
        true
    }

    /// Driver-specific stop hook.
    fn stop(&self) -> bool {
        true
    }

    /// Item-level state of `port`, read through `phi`.
    fn state(&self, _phi: &dyn Phi, _port: &str, _timeout: Duration) -> Option<Value> {
        None
    }

    /// Apply an item-level action on `port` through `phi`.
    fn action(&self, _phi: &dyn Phi, _port: &str, _value: &Value, _timeout: Duration) -> bool {
        false
    }

    /// Self test / debug command.
    fn test(&self, _cmd: &str) -> Value {
        Value::from("FAILED")
    }

    /// Introspection data, see [`LpiBase::serialize`].
    fn serialize(&self, full: bool, config: bool, helpinfo: Option<&str>) -> Result<Value, DriverError> {
        Ok(self.base().serialize(full, config, helpinfo))
    }
}
