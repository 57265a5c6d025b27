//! Sensor LPI.
//!
//! Passes the PHI port value through as the sensor value. Sensors are
//! read-only, so actions are refused.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uc_common::prelude::*;

/// Module metadata.
pub static MODULE: DriverModule = DriverModule {
    id: "sensor",
    api_version: 1,
    author: "RTS007",
    license: "AGPL3",
    version: "1.0.0",
    description: "Basic LPI for sensors",
    features: &["value"],
    required: &["port_get"],
    ..DriverModule::EMPTY
};

/// Sensor LPI.
pub struct Sensor {
    base: LpiBase,
}

/// Module factory.
pub fn create(init: LpiInit) -> Arc<dyn Lpi> {
    Arc::new(Sensor {
        base: LpiBase::new(&MODULE, init),
    })
}

impl Lpi for Sensor {
    fn base(&self) -> &LpiBase {
        &self.base
    }

    fn state(&self, phi: &dyn Phi, port: &str, timeout: Duration) -> Option<Value> {
        phi.get(Some(port), None, timeout)
    }

    fn action(&self, _phi: &dyn Phi, port: &str, _value: &Value, _timeout: Duration) -> bool {
        warn!("LPI {}: sensor port {port} is read-only", self.base.driver_id());
        false
    }
}
