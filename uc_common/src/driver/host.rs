//! Core services offered by the controller to its drivers.

use crate::config::DriverApiConfig;
use crate::driver::namespace::SharedNamespaces;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::error;

/// Hook invoked when a driver reports a process-critical condition.
pub type CriticalHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Host services shared by every driver of one controller.
pub struct HostContext {
    timeout: Duration,
    polldelay: Duration,
    sleep_step: Duration,
    runtime_dir: PathBuf,
    namespaces: SharedNamespaces,
    critical: Option<CriticalHook>,
    started: AtomicBool,
}

impl HostContext {
    /// Build a context from the `[drivers]` configuration section.
    pub fn new(config: &DriverApiConfig) -> Self {
        Self {
            timeout: config.timeout(),
            polldelay: config.polldelay(),
            sleep_step: config.sleep_step(),
            runtime_dir: config.runtime_dir.clone(),
            namespaces: SharedNamespaces::new(),
            critical: None,
            started: AtomicBool::new(false),
        }
    }

    /// Install the process-critical escalation hook.
    pub fn with_critical_hook(mut self, hook: CriticalHook) -> Self {
        self.critical = Some(hook);
        self
    }

    /// Override the scheduler sleep step.
    pub fn with_sleep_step(mut self, step: Duration) -> Self {
        self.sleep_step = step;
        self
    }

    /// Override the runtime directory.
    pub fn with_runtime_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.runtime_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Equipment timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Controller idle loop delay.
    pub fn polldelay(&self) -> Duration {
        self.polldelay
    }

    /// Update scheduler sleep granularity.
    pub fn sleep_step(&self) -> Duration {
        self.sleep_step
    }

    /// Runtime directory.
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Shared namespace registry.
    pub fn namespaces(&self) -> &SharedNamespaces {
        &self.namespaces
    }

    /// Whether the controller finished its startup sequence. Drivers
    /// launched after that poll once right away instead of waiting for the
    /// first scheduled update.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Mark the startup sequence as finished (or the host as stopping).
    pub fn set_started(&self, started: bool) {
        self.started.store(started, Ordering::SeqCst);
    }

    /// Escalate a process-critical condition. `source` names the reporter
    /// and the condition; it is logged once and passed to the hook.
    pub fn critical(&self, source: &str) {
        error!("critical condition: {source}");
        if let Some(hook) = &self.critical {
            hook(source);
        }
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new(&DriverApiConfig::default())
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("timeout", &self.timeout)
            .field("polldelay", &self.polldelay)
            .field("sleep_step", &self.sleep_step)
            .field("runtime_dir", &self.runtime_dir)
            .field("critical_hook", &self.critical.is_some())
            .field("started", &self.is_started())
            .finish()
    }
}
