//! Controller process wiring.
//!
//! The `Controller` owns the `DriverManager` for the life of the process:
//! it restores the driver snapshot, starts every driver, idles until
//! shutdown is requested, then saves the snapshot and stops the drivers.

use crate::manager::DriverManager;
use crate::module_registry::ModuleRegistry;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uc_common::config::{ConfigError, ConfigLoader, ControllerConfig};
use uc_common::driver::{DriverError, HostContext, StateMap};
use uc_common::item::{Item, ItemUpdateSink};

/// Controller startup/shutdown errors.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Driver subsystem error.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Item update sink that only logs, for running without an item model.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingUpdateSink;

impl ItemUpdateSink for LoggingUpdateSink {
    fn update_item(&self, item: &Arc<dyn Item>, data: &StateMap) {
        debug!("item {} update: {}", item.oid(), serde_json::Value::Object(data.clone()));
    }
}

/// Controller owning the driver subsystem.
pub struct Controller {
    config: ControllerConfig,
    manager: Arc<DriverManager>,
    running: Arc<AtomicBool>,
    polldelay: Duration,
}

impl Controller {
    /// Create a controller with the given configuration.
    ///
    /// # Errors
    /// Returns error if configuration validation fails.
    pub fn new(
        config: ControllerConfig,
        modules: ModuleRegistry,
        sink: Arc<dyn ItemUpdateSink>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;

        let running = Arc::new(AtomicBool::new(false));
        let mut host = HostContext::new(&config.drivers);
        if config.drivers.stop_on_critical {
            let flag = Arc::clone(&running);
            host = host.with_critical_hook(Arc::new(move |source: &str| {
                warn!("stopping controller, critical condition in {source}");
                flag.store(false, Ordering::SeqCst);
            }));
        }
        let polldelay = host.polldelay();
        let manager = Arc::new(DriverManager::new(modules, Arc::new(host), sink));

        info!(
            "Controller {} created, runtime dir {:?}",
            config.shared.service_name, config.drivers.runtime_dir
        );

        Ok(Self {
            config,
            manager,
            running,
            polldelay,
        })
    }

    /// Load controller configuration from a TOML file.
    pub fn load_config(config_path: &Path) -> Result<ControllerConfig, ControllerError> {
        info!("Loading configuration from {:?}", config_path);
        let config = ControllerConfig::load(config_path).inspect_err(|e| {
            error!("Failed to load config file {:?}: {e}", config_path);
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Restore the driver snapshot and start every driver.
    ///
    /// An unreadable snapshot is logged and the controller starts with no
    /// drivers.
    pub fn init(&self) -> Result<(), ControllerError> {
        info!("Initializing driver subsystem...");
        if let Err(e) = self.manager.load() {
            warn!("Starting without restored drivers: {e}");
        }
        self.manager.start();
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Driver subsystem initialized: {} PHI(s), {} LPI(s)",
            self.manager.phi_ids().len(),
            self.manager.driver_ids().len()
        );
        Ok(())
    }

    /// Idle until shutdown is requested through the running flag.
    pub fn run(&self) {
        info!("Controller {} running", self.config.shared.service_name);
        while self.running.load(Ordering::SeqCst) {
            std::thread::sleep(self.polldelay);
        }
        info!("Controller {} stopped", self.config.shared.service_name);
    }

    /// Save the driver snapshot and stop every driver.
    pub fn shutdown(&self) -> Result<(), ControllerError> {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        let saved = self.manager.save();
        self.manager.stop();
        saved?;
        Ok(())
    }

    /// Driver manager, for the management API layer.
    pub fn manager(&self) -> &Arc<DriverManager> {
        &self.manager
    }

    /// Controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use uc_common::config::{DriverApiConfig, LogLevel, SharedConfig};

    fn config(runtime_dir: &Path, stop_on_critical: bool) -> ControllerConfig {
        ControllerConfig {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "uc-test".to_string(),
            },
            drivers: DriverApiConfig {
                polldelay: 0.01,
                runtime_dir: runtime_dir.to_path_buf(),
                stop_on_critical,
                ..Default::default()
            },
        }
    }

    fn controller(runtime_dir: &Path, stop_on_critical: bool) -> Controller {
        Controller::new(
            config(runtime_dir, stop_on_critical),
            ModuleRegistry::with_builtin().unwrap(),
            Arc::new(LoggingUpdateSink),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path(), false);
        cfg.shared.service_name.clear();
        let result = Controller::new(
            cfg,
            ModuleRegistry::new(),
            Arc::new(LoggingUpdateSink),
        );
        assert!(matches!(result, Err(ControllerError::Config(_))));
    }

    #[test]
    fn test_shutdown_saves_and_init_restores() {
        let dir = tempdir().unwrap();
        {
            let c = controller(dir.path(), false);
            c.init().unwrap();
            c.manager()
                .load_phi("relay1", "vrtrelay", StateMap::new(), true)
                .unwrap();
            c.manager()
                .load_lpi("basic", "basic", "relay1", StateMap::new(), true)
                .unwrap();
            c.shutdown().unwrap();
            assert!(!c.running_flag().load(Ordering::SeqCst));
        }

        let c = controller(dir.path(), false);
        c.init().unwrap();
        assert!(c.manager().get_phi("relay1").is_some());
        assert!(c.manager().get_driver("relay1.basic").is_some());
        assert_eq!(
            c.manager().lpi_state("relay1.basic", "1").unwrap(),
            Some(json!(-1))
        );
        c.shutdown().unwrap();
    }

    #[test]
    fn test_stop_on_critical() {
        let dir = tempdir().unwrap();
        let c = controller(dir.path(), true);
        c.init().unwrap();
        c.manager()
            .load_phi("relay1", "vrtrelay", StateMap::new(), true)
            .unwrap();
        assert!(c.running_flag().load(Ordering::SeqCst));
        assert_eq!(c.manager().test_phi("relay1", "critical").unwrap(), json!(true));
        assert!(!c.running_flag().load(Ordering::SeqCst));
        // run() returns immediately once the flag is cleared.
        c.run();
        c.shutdown().unwrap();
    }

    #[test]
    fn test_critical_ignored_by_default() {
        let dir = tempdir().unwrap();
        let c = controller(dir.path(), false);
        c.init().unwrap();
        c.manager()
            .load_phi("relay1", "vrtrelay", StateMap::new(), true)
            .unwrap();
        c.manager().test_phi("relay1", "critical").unwrap();
        assert!(c.running_flag().load(Ordering::SeqCst));
        c.shutdown().unwrap();
    }
}
