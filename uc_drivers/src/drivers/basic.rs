//! Basic unit LPI.
//!
//! Maps a unit's status directly onto one PHI port: `state` reads the port,
//! `action` writes it.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uc_common::prelude::*;

/// Module metadata.
pub static MODULE: DriverModule = DriverModule {
    id: "basic",
    api_version: 1,
    author: "RTS007",
    license: "AGPL3",
    version: "1.0.0",
    description: "Basic LPI for simple devices",
    features: &["status", "action"],
    required: &["port_get", "port_set"],
    help: "Unit status is the port value; an action sets the port to the requested status.",
    ..DriverModule::EMPTY
};

/// Basic unit LPI.
pub struct Basic {
    base: LpiBase,
}

/// Module factory.
pub fn create(init: LpiInit) -> Arc<dyn Lpi> {
    Arc::new(Basic {
        base: LpiBase::new(&MODULE, init),
    })
}

impl Lpi for Basic {
    fn base(&self) -> &LpiBase {
        &self.base
    }

    fn state(&self, phi: &dyn Phi, port: &str, timeout: Duration) -> Option<Value> {
        if !phi.base().has_feature().port_get {
            error!(
                "LPI {}: PHI {} can not get single ports",
                self.base.driver_id(),
                phi.base().phi_id()
            );
            return None;
        }
        phi.get(Some(port), None, timeout)
    }

    fn action(&self, phi: &dyn Phi, port: &str, value: &Value, timeout: Duration) -> bool {
        if !phi.base().has_feature().port_set {
            error!(
                "LPI {}: PHI {} can not set single ports",
                self.base.driver_id(),
                phi.base().phi_id()
            );
            return false;
        }
        let Some(status) = value_i64(value) else {
            warn!("LPI {}: invalid status {value}", self.base.driver_id());
            return false;
        };
        phi.set(&PortSpec::from(port), &Value::from(status), None, timeout)
    }

    fn test(&self, cmd: &str) -> Value {
        match cmd {
            "self" => Value::from("OK"),
            _ => json!({"self": "self test"}),
        }
    }
}
