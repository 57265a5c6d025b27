//! Virtual 16-port relay.
//!
//! Keeps port states in memory. Useful for tests and for debugging item
//! logic without equipment.

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uc_common::prelude::*;

const PORT_MIN: i64 = 1;
const PORT_MAX: i64 = 16;

/// Module metadata.
pub static MODULE: DriverModule = DriverModule {
    id: "vrtrelay",
    api_version: 1,
    author: "RTS007",
    license: "AGPL3",
    version: "1.0.0",
    description: "Emulates 16-port relay",
    equipment: &["virtual"],
    features: &["port_get", "port_set", "aao_set", "aao_get"],
    required: &["port_get", "port_set"],
    lpi_default: Some("basic"),
    help: "Simple 16-port virtual relay, may be used for the various tests/debugging.",
    config_help: &[
        HelpEntry {
            name: "default_status",
            help: "ports status on load (default: -1)",
            kind: "int",
            required: false,
        },
        HelpEntry {
            name: "event_on_set",
            help: "publish all ports after every set",
            kind: "bool",
            required: false,
        },
        HelpEntry {
            name: "event_on_test_set",
            help: "publish all ports after a test X=S command",
            kind: "bool",
            required: false,
        },
    ],
    ports_help: "1..16",
    can_get_ports: true,
    ..DriverModule::EMPTY
};

/// Virtual relay PHI.
pub struct VrtRelay {
    base: PhiBase,
    data: Mutex<StateMap>,
}

/// Module factory.
pub fn create(init: PhiInit) -> Arc<dyn Phi> {
    Arc::new(VrtRelay::new(init))
}

impl VrtRelay {
    /// Create a relay with every port at `default_status`.
    pub fn new(init: PhiInit) -> Self {
        let base = PhiBase::new(&MODULE, init);
        let status = cfg_i64(base.config(), "default_status").unwrap_or(-1);
        let data = (PORT_MIN..=PORT_MAX)
            .map(|i| (i.to_string(), Value::from(status)))
            .collect();
        Self {
            base,
            data: Mutex::new(data),
        }
    }

    fn publish(&self, port: &str, option: &str) {
        if cfg_bool(self.base.config(), option) {
            let data = self.data.lock().clone();
            self.base.emit(port, &data);
        }
    }
}

impl Phi for VrtRelay {
    fn base(&self) -> &PhiBase {
        &self.base
    }

    fn get(&self, port: Option<&str>, _cfg: Option<&StateMap>, _timeout: Duration) -> Option<Value> {
        let data = self.data.lock();
        match port {
            None | Some("") => Some(Value::Object(data.clone())),
            Some(port) => data.get(port).cloned(),
        }
    }

    fn set(&self, port: &PortSpec, data: &Value, _cfg: Option<&StateMap>, _timeout: Duration) -> bool {
        let Some(pairs) = port.pair(data) else {
            return false;
        };
        {
            let mut state = self.data.lock();
            let mut parsed = Vec::with_capacity(pairs.len());
            for (p, d) in pairs {
                match value_i64(d) {
                    Some(status) if state.contains_key(p) => parsed.push((p, status)),
                    _ => return false,
                }
            }
            for (p, status) in parsed {
                state.insert(p.to_string(), Value::from(status));
            }
        }
        self.publish(&port.ports().join(","), "event_on_set");
        true
    }

    fn test(&self, cmd: &str) -> Value {
        match cmd {
            "self" => return Value::from("OK"),
            "get" => return Value::Object(self.data.lock().clone()),
            "critical" => {
                self.base.critical("test");
                return Value::Bool(true);
            }
            _ => {}
        }
        let parsed = cmd
            .split_once('=')
            .and_then(|(p, v)| Some((p.trim().parse::<i64>().ok()?, v.trim().parse::<i64>().ok()?)));
        let Some((port, status)) = parsed else {
            return json!({"get": "get relay ports status", "X=S": "set port X to S"});
        };
        if !(PORT_MIN..=PORT_MAX).contains(&port) || !(-1..=1).contains(&status) {
            return Value::Null;
        }
        self.data
            .lock()
            .insert(port.to_string(), Value::from(status));
        debug!("PHI {}: test set port {port}={status}", self.base.phi_id());
        self.publish(&port.to_string(), "event_on_test_set");
        Value::Object(self.data.lock().clone())
    }

    fn get_ports(&self) -> Option<Value> {
        Some(PhiBase::generate_port_list(
            PORT_MIN as u32,
            PORT_MAX as u32,
            "relay port #{}",
            "virtual relay port #{}",
        ))
    }
}
