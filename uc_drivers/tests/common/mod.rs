//! Shared fixtures for the driver subsystem integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use uc_common::driver::{
    DriverError, DriverModule, HostContext, Phi, PhiBase, PhiInit, StateMap,
};
use uc_common::item::{BasicItem, Item, ItemUpdateSink};
use uc_drivers::{DriverManager, ModuleRegistry};

/// Namespace the fixture drivers report their `get()` call counts to.
pub const CALLS_NAMESPACE: &str = "calls";

/// Item update sink recording every delivered update.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<(String, StateMap)>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<(String, StateMap)> {
        self.updates.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.updates.lock().len()
    }
}

impl ItemUpdateSink for RecordingSink {
    fn update_item(&self, item: &Arc<dyn Item>, data: &StateMap) {
        self.updates
            .lock()
            .push((item.full_id().to_string(), data.clone()));
    }
}

// ─── Fixture PHIs ─────────────────────────────────────────────────────

/// Returns `{"1": 0}` forever.
pub static CONSTANT: DriverModule = DriverModule {
    id: "constant",
    api_version: 1,
    features: &["aao_get"],
    shared_namespaces: &[CALLS_NAMESPACE],
    ..DriverModule::EMPTY
};

/// Returns `{"a": n, "b": 0}` where `n` counts calls.
pub static COUNTER: DriverModule = DriverModule {
    id: "counter",
    api_version: 1,
    features: &["aao_get"],
    shared_namespaces: &[CALLS_NAMESPACE],
    ..DriverModule::EMPTY
};

/// Panics on its first `get()`, then returns `{"1": 1}`.
pub static PANICKY: DriverModule = DriverModule {
    id: "panicky",
    api_version: 1,
    features: &["aao_get"],
    shared_namespaces: &[CALLS_NAMESPACE],
    ..DriverModule::EMPTY
};

/// Fails to serialize.
pub static BROKEN: DriverModule = DriverModule {
    id: "broken",
    api_version: 1,
    ..DriverModule::EMPTY
};

/// Never becomes ready.
pub static UNREADY: DriverModule = DriverModule {
    id: "unready",
    api_version: 1,
    ..DriverModule::EMPTY
};

/// Requires a driver API newer than any host.
pub static FUTURE: DriverModule = DriverModule {
    id: "future",
    api_version: 99,
    ..DriverModule::EMPTY
};

pub struct FixturePhi {
    base: PhiBase,
    calls: AtomicUsize,
}

impl FixturePhi {
    fn new(module: &'static DriverModule, init: PhiInit) -> Self {
        Self {
            base: PhiBase::new(module, init),
            calls: AtomicUsize::new(0),
        }
    }

    fn count_call(&self) -> usize {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(ns) = self.base.shared_namespace(CALLS_NAMESPACE) {
            ns.set(self.base.phi_id(), json!(n));
        }
        n
    }
}

impl Phi for FixturePhi {
    fn base(&self) -> &PhiBase {
        &self.base
    }

    fn get(&self, _port: Option<&str>, _cfg: Option<&StateMap>, _timeout: Duration) -> Option<Value> {
        let n = self.count_call();
        match self.base.module().id {
            "constant" => Some(json!({"1": 0})),
            "counter" => Some(json!({"a": n, "b": 0})),
            "panicky" if n == 1 => panic!("equipment exploded"),
            "panicky" => Some(json!({"1": 1})),
            _ => None,
        }
    }

    fn serialize(&self, full: bool, config: bool, helpinfo: Option<&str>) -> Result<Value, DriverError> {
        if self.base.module().id == "broken" {
            return Err(DriverError::Serialize {
                id: self.base.phi_id().to_string(),
                reason: "equipment state unavailable".to_string(),
            });
        }
        Ok(self.base.serialize(full, config, helpinfo))
    }
}

fn create_constant(init: PhiInit) -> Arc<dyn Phi> {
    Arc::new(FixturePhi::new(&CONSTANT, init))
}

fn create_counter(init: PhiInit) -> Arc<dyn Phi> {
    Arc::new(FixturePhi::new(&COUNTER, init))
}

fn create_panicky(init: PhiInit) -> Arc<dyn Phi> {
    Arc::new(FixturePhi::new(&PANICKY, init))
}

fn create_broken(init: PhiInit) -> Arc<dyn Phi> {
    Arc::new(FixturePhi::new(&BROKEN, init))
}

fn create_unready(init: PhiInit) -> Arc<dyn Phi> {
    let phi = FixturePhi::new(&UNREADY, init);
    phi.base.set_not_ready("no equipment");
    Arc::new(phi)
}

fn create_future(init: PhiInit) -> Arc<dyn Phi> {
    Arc::new(FixturePhi::new(&FUTURE, init))
}

/// Built-in modules plus the fixture modules.
pub fn modules() -> ModuleRegistry {
    let mut registry = ModuleRegistry::with_builtin().unwrap();
    registry.register_phi(&CONSTANT, create_constant).unwrap();
    registry.register_phi(&COUNTER, create_counter).unwrap();
    registry.register_phi(&PANICKY, create_panicky).unwrap();
    registry.register_phi(&BROKEN, create_broken).unwrap();
    registry.register_phi(&UNREADY, create_unready).unwrap();
    registry.register_phi(&FUTURE, create_future).unwrap();
    registry
}

/// Host with a short scheduler step, keeping its snapshot in `runtime_dir`.
pub fn host(runtime_dir: &Path) -> Arc<HostContext> {
    Arc::new(
        HostContext::default()
            .with_sleep_step(Duration::from_millis(5))
            .with_runtime_dir(runtime_dir),
    )
}

/// Manager over [`modules`] recording item updates.
pub fn manager(runtime_dir: &Path) -> (DriverManager, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let manager = DriverManager::new(modules(), host(runtime_dir), sink.clone());
    (manager, sink)
}

/// Number of `get()` calls a fixture PHI has seen.
pub fn get_calls(manager: &DriverManager, phi_id: &str) -> usize {
    manager
        .host()
        .namespaces()
        .get_or_create(CALLS_NAMESPACE)
        .get(phi_id)
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn item(full_id: &str, update_exec: &str) -> Arc<BasicItem> {
    Arc::new(BasicItem::new("unit", full_id, Some(update_exec)))
}

pub fn cfg(value: Value) -> StateMap {
    value.as_object().cloned().unwrap_or_default()
}

pub fn as_item(item: &Arc<BasicItem>) -> Arc<dyn Item> {
    item.clone()
}
