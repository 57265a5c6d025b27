//! Virtual sensors.
//!
//! Ten sensor ports, `1000`..`1009`. Only single-port `get()` is
//! implemented; values are changed with the `X=S` test command.

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uc_common::prelude::*;

/// Module metadata.
pub static MODULE: DriverModule = DriverModule {
    id: "vrtsensors",
    api_version: 1,
    author: "RTS007",
    license: "AGPL3",
    version: "1.0.0",
    description: "Emulates virtual sensors",
    equipment: &["virtual"],
    features: &["port_get", "port_set", "aao_set"],
    required: &["port_get", "value"],
    lpi_default: Some("sensor"),
    config_help: &[
        HelpEntry {
            name: "default_value",
            help: "sensors value on load (default: None)",
            kind: "float",
            required: false,
        },
        HelpEntry {
            name: "event_on_test_set",
            help: "publish all sensors after a test X=S command",
            kind: "bool",
            required: false,
        },
    ],
    ports_help: "1000..1009",
    ..DriverModule::EMPTY
};

/// Virtual sensors PHI.
pub struct VrtSensors {
    base: PhiBase,
    data: Mutex<StateMap>,
}

/// Module factory.
pub fn create(init: PhiInit) -> Arc<dyn Phi> {
    Arc::new(VrtSensors::new(init))
}

impl VrtSensors {
    /// Create sensors with every port at `default_value`.
    pub fn new(init: PhiInit) -> Self {
        let base = PhiBase::new(&MODULE, init);
        let value = cfg_f64(base.config(), "default_value").map_or(Value::Null, Value::from);
        let data = (1000..1010)
            .map(|i: u32| (i.to_string(), value.clone()))
            .collect();
        Self {
            base,
            data: Mutex::new(data),
        }
    }
}

impl Phi for VrtSensors {
    fn base(&self) -> &PhiBase {
        &self.base
    }

    fn get(&self, port: Option<&str>, _cfg: Option<&StateMap>, _timeout: Duration) -> Option<Value> {
        self.data.lock().get(port?).cloned()
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
        let parts: Vec<&str> = cmd.split('=').collect();
        let [port, value] = parts[..] else {
            return json!({"get": "get sensors values", "X=S": "set sensor port X to S"});
        };
        let value = value_f64(&Value::from(value)).map_or(Value::Null, Value::from);
        debug!("PHI {}: test set port {port}={value}", self.base.phi_id());
        let data = {
            let mut data = self.data.lock();
            data.insert(port.to_string(), value);
            data.clone()
        };
        if cfg_bool(self.base.config(), "event_on_test_set") {
            self.base.emit(port, &data);
        }
        Value::Object(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uc_common::driver::NullEventSink;

    const T: Duration = Duration::from_secs(1);

    fn sensors(config: Value) -> VrtSensors {
        VrtSensors::new(PhiInit {
            phi_id: "s1".to_string(),
            config: config.as_object().cloned().unwrap_or_default(),
            host: Arc::new(HostContext::default()),
            events: Arc::new(NullEventSink),
        })
    }

    #[test]
    fn test_default_value() {
        let s = sensors(json!({}));
        assert_eq!(s.get(Some("1000"), None, T), Some(Value::Null));
        assert_eq!(s.get(None, None, T), None);

        let s = sensors(json!({"default_value": "21.5"}));
        assert_eq!(s.get(Some("1009"), None, T), Some(json!(21.5)));
        assert_eq!(s.get(Some("1010"), None, T), None);
    }

    #[test]
    fn test_partial_driver() {
        let s = sensors(json!({}));
        assert!(!s.set(&PortSpec::from("1000"), &json!(1), None, T));
        assert!(s.get_ports().is_none());
    }

    #[test]
    fn test_set_by_command() {
        let s = sensors(json!({}));
        assert_eq!(s.test("1001=3.5")["1001"], json!(3.5));
        assert_eq!(s.get(Some("1001"), None, T), Some(json!(3.5)));
        assert_eq!(s.test("1001=x")["1001"], Value::Null);
        assert!(s.test("nothing").get("X=S").is_some());
        s.test("1002=4");
        assert!(s.test("1002=5=6").get("X=S").is_some());
        assert_eq!(s.get(Some("1002"), None, T), Some(json!(4.0)));
        assert_eq!(s.test("self"), json!("OK"));
    }
}
