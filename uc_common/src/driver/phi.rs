//! Physical hardware interface (PHI) drivers.
//!
//! A concrete driver embeds a [`PhiBase`] and implements [`Phi`]. Every
//! trait method except [`Phi::base`] has a safe default, so a partial driver
//! still loads.
//!
//! # Lifecycle
//!
//! 1. Constructed by its module factory from a [`PhiInit`]
//! 2. `launch()` - starts the update pipeline (if any), then [`Phi::start`]
//! 3. `halt()` - stops the update pipeline, then [`Phi::stop`]
//!
//! # Update pipeline
//!
//! Active when the module declares `aao_get` and the instance config sets a
//! nonzero `update` interval. Each pass calls `get()` for all ports and
//! publishes the ports whose value changed since the previous pass.

use crate::consts::SCHEDULER_PORT;
use crate::driver::capability::{CapabilityFlags, DeclaredCapabilities};
use crate::driver::error::DriverError;
use crate::driver::host::HostContext;
use crate::driver::module::DriverModule;
use crate::driver::namespace::SharedNamespace;
use crate::driver::params::{cfg_bool, cfg_f64};
use crate::driver::update::UpdatePipeline;
use crate::driver::{EventSink, PortSpec, StateMap};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Construction arguments handed to a PHI module factory.
#[derive(Clone)]
pub struct PhiInit {
    /// Registry id of the new instance.
    pub phi_id: String,
    /// Instance configuration.
    pub config: StateMap,
    /// Host services.
    pub host: Arc<HostContext>,
    /// Destination of published events.
    pub events: Arc<dyn EventSink>,
}

/// Single-slot state cache with TTL.
#[derive(Debug)]
struct CacheSlot {
    ttl: Option<Duration>,
    slot: Mutex<Option<(Instant, Value)>>,
}

impl CacheSlot {
    fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    fn get(&self) -> Option<Value> {
        let ttl = self.ttl?;
        match &*self.slot.lock() {
            Some((set_at, data)) if set_at.elapsed() < ttl => Some(data.clone()),
            _ => None,
        }
    }

    fn set(&self, data: Value) -> bool {
        if self.ttl.is_none() {
            return false;
        }
        *self.slot.lock() = Some((Instant::now(), data));
        true
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// Behavior shared by every PHI.
pub struct PhiBase {
    module: &'static DriverModule,
    phi_id: String,
    oid: String,
    config: StateMap,
    capabilities: DeclaredCapabilities,
    cache: CacheSlot,
    pipeline: UpdatePipeline,
    ready: AtomicBool,
    host: Arc<HostContext>,
    events: Arc<dyn EventSink>,
}

impl PhiBase {
    /// Build the base from module metadata and construction arguments.
    ///
    /// Config keys read here: `cache` (TTL seconds), `update` (poll
    /// interval seconds), `benchmark` (throughput logging).
    pub fn new(module: &'static DriverModule, init: PhiInit) -> Self {
        let owner = format!("PHI {}", init.phi_id);
        let capabilities =
            DeclaredCapabilities::from_declared(&owner, module.features, module.required);
        let cache = positive_secs(cfg_f64(&init.config, "cache"));
        let interval = positive_secs(cfg_f64(&init.config, "update"));
        let benchmark = cfg_bool(&init.config, "benchmark");
        Self {
            module,
            oid: format!("phi:{}", init.phi_id),
            phi_id: init.phi_id,
            config: init.config,
            capabilities,
            cache: CacheSlot::new(cache),
            pipeline: UpdatePipeline::new(interval, benchmark),
            ready: AtomicBool::new(true),
            host: init.host,
            events: init.events,
        }
    }

    /// Module metadata.
    pub fn module(&self) -> &'static DriverModule {
        self.module
    }

    /// Registry id.
    pub fn phi_id(&self) -> &str {
        &self.phi_id
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

    /// Provided capability flags.
    pub fn has_feature(&self) -> &CapabilityFlags {
        self.capabilities.has_feature()
    }

    /// Required capability flags.
    pub fn is_required(&self) -> &CapabilityFlags {
        self.capabilities.is_required()
    }

    /// Host services.
    pub fn host(&self) -> &HostContext {
        &self.host
    }

    /// Update pipeline.
    pub fn pipeline(&self) -> &UpdatePipeline {
        &self.pipeline
    }

    /// Configured update interval.
    pub fn update_interval(&self) -> Option<Duration> {
        self.pipeline.interval()
    }

    /// Whether the instance initialized successfully.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Mark the instance as failed to initialize. Logs `reason`.
    pub fn set_not_ready(&self, reason: &str) {
        error!("PHI {}: {reason}", self.phi_id);
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Cached state, if the cache is enabled and still fresh.
    pub fn get_cached_state(&self) -> Option<Value> {
        self.cache.get()
    }

    /// Cache `data`. Returns `false` when caching is disabled.
    pub fn set_cached_state(&self, data: Value) -> bool {
        self.cache.set(data)
    }

    /// Drop cached state.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Publish a state change on `port`.
    pub fn emit(&self, port: &str, data: &StateMap) {
        self.events.handle_phi_event(&self.phi_id, port, data);
    }

    /// Report a process-critical condition.
    pub fn critical(&self, msg: &str) {
        self.host.critical(&format!("PHI {}: {msg}", self.phi_id));
    }

    /// Shared namespace, if the module's allow-list names it.
    pub fn shared_namespace(&self, name: &str) -> Option<Arc<SharedNamespace>> {
        if !self.module.shared_namespaces.iter().any(|ns| *ns == name) {
            warn!("PHI {}: shared namespace {name} not allowed", self.phi_id);
            return None;
        }
        Some(self.host.namespaces().get_or_create(name))
    }

    /// Introspection data.
    ///
    /// With `helpinfo` set, returns the named help schema (or `Null` for an
    /// unknown name) instead of instance data.
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
        d.insert("mod".to_string(), Value::from(self.module.id));
        d.insert("id".to_string(), Value::from(self.phi_id.as_str()));
        Value::Object(d)
    }

    /// Build a port list: `[{port, name, description}, ...]` for
    /// `port_min..=port_max`, `{}` in templates replaced by the port number.
    pub fn generate_port_list(port_min: u32, port_max: u32, name: &str, description: &str) -> Value {
        (port_min..=port_max)
            .map(|i| {
                let p = i.to_string();
                json!({
                    "port": p,
                    "name": name.replace("{}", &p),
                    "description": description.replace("{}", &p),
                })
            })
            .collect()
    }
}

/// Interface every PHI implements.
pub trait Phi: Send + Sync {
    /// Shared base behavior.
    fn base(&self) -> &PhiBase;

    /// Read equipment state: one port, or all ports as a mapping.
    fn get(&self, _port: Option<&str>, _cfg: Option<&StateMap>, _timeout: Duration) -> Option<Value> {
        None
    }

    /// Write equipment state.
    fn set(
        &self,
        _port: &PortSpec,
        _data: &Value,
        _cfg: Option<&StateMap>,
        _timeout: Duration,
    ) -> bool {
        false
    }

    /// Driver-specific start hook.
    fn start(&self) -> bool {
        true
    }

    /// Driver-specific stop hook.
    fn stop(&self) -> bool {
        true
    }

    /// Self test / debug command.
    fn test(&self, _cmd: &str) -> Value {
        Value::from("FAILED")
    }

    /// Equipment-specific command.
    fn exec(&self, _cmd: &str, _args: Option<&str>) -> Value {
        Value::from("not implemented")
    }

    /// Available ports, for drivers that can enumerate them.
    fn get_ports(&self) -> Option<Value> {
        None
    }

    /// Discover equipment on `interface`.
    fn discover(&self, _interface: &str, _timeout: Duration) -> Option<Value> {
        None
    }

    /// Introspection data, see [`PhiBase::serialize`].
    fn serialize(&self, full: bool, config: bool, helpinfo: Option<&str>) -> Result<Value, DriverError> {
        Ok(self.base().serialize(full, config, helpinfo))
    }
}

impl dyn Phi {
    /// Start the update pipeline (when enabled) and the driver. Idempotent.
    ///
    /// On a host that has already started, the first update runs right
    /// away; during startup it waits for the first scheduled fire.
    pub fn launch(self: &Arc<Self>) -> bool {
        let base = self.base();
        if base.has_feature().aao_get && base.update_interval().is_some() {
            if let Err(e) = base.pipeline().start(
                Arc::downgrade(self),
                base.oid(),
                base.host().sleep_step(),
            ) {
                error!("PHI {}: unable to start update pipeline: {e}", base.phi_id());
                base.pipeline().stop();
                return false;
            }
            if base.host().is_started() {
                base.pipeline().wake();
            }
        }
        self.start()
    }

    /// Stop the update pipeline and the driver. Idempotent, never blocks on
    /// a thread that was not started.
    pub fn halt(&self) -> bool {
        self.base().pipeline().stop();
        self.stop()
    }

    /// One scheduled update pass: poll all ports, publish the delta.
    pub fn perform_update(&self) {
        let base = self.base();
        let state = match self.get(None, None, base.host().timeout()) {
            Some(Value::Object(state)) if !state.is_empty() => state,
            Some(Value::Object(_)) | Some(Value::Null) | None => return,
            Some(other) => {
                debug!(
                    "PHI {}: scheduled get returned non-mapping state: {other}",
                    base.phi_id()
                );
                return;
            }
        };
        let delta = base
            .pipeline()
            .record(&format!("PHI {}", base.phi_id()), state);
        if !delta.is_empty() {
            base.emit(SCHEDULER_PORT, &delta);
        }
    }
}

fn positive_secs(secs: Option<f64>) -> Option<Duration> {
    secs.filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}
