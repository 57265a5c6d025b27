//! Module registry for PHI and LPI drivers.
//!
//! Every driver module is registered once, at startup, as static metadata
//! plus a factory function. Resolving a module re-reads its metadata and
//! checks the declared driver API version against the host's, so a module
//! built for a newer host is refused before anything is constructed.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use uc_common::consts::DRIVER_API_VERSION;
use uc_common::driver::{
    DriverError, DriverKind, DriverModule, Lpi, LpiInit, Phi, PhiInit, StateMap,
};

/// Factory constructing a PHI instance.
pub type PhiFactory = fn(PhiInit) -> Arc<dyn Phi>;

/// Factory constructing an LPI instance.
pub type LpiFactory = fn(LpiInit) -> Arc<dyn Lpi>;

/// A registered PHI module.
#[derive(Debug, Clone, Copy)]
pub struct PhiModule {
    /// Declared metadata.
    pub meta: &'static DriverModule,
    /// Instance factory.
    pub factory: PhiFactory,
}

/// A registered LPI module.
#[derive(Debug, Clone, Copy)]
pub struct LpiModule {
    /// Declared metadata.
    pub meta: &'static DriverModule,
    /// Instance factory.
    pub factory: LpiFactory,
}

/// Registry of available driver modules.
///
/// Constructed at startup, populated via `register_phi()`/`register_lpi()`,
/// and handed to the `DriverManager` by value. No global state.
#[derive(Debug)]
pub struct ModuleRegistry {
    phi: HashMap<&'static str, PhiModule>,
    lpi: HashMap<&'static str, LpiModule>,
    api_version: u32,
}

impl ModuleRegistry {
    /// Create an empty registry for the host's driver API version.
    pub fn new() -> Self {
        Self::with_api_version(DRIVER_API_VERSION)
    }

    /// Create an empty registry for an explicit host API version.
    pub fn with_api_version(api_version: u32) -> Self {
        Self {
            phi: HashMap::new(),
            lpi: HashMap::new(),
            api_version,
        }
    }

    /// Registry with every built-in module.
    pub fn with_builtin() -> Result<Self, DriverError> {
        let mut registry = Self::new();
        crate::drivers::register_all(&mut registry)?;
        Ok(registry)
    }

    /// Host driver API version.
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Register a PHI module.
    ///
    /// # Errors
    /// Returns `DriverError::DuplicateModule` if the name is taken.
    pub fn register_phi(
        &mut self,
        meta: &'static DriverModule,
        factory: PhiFactory,
    ) -> Result<(), DriverError> {
        if self.phi.contains_key(meta.id) {
            return Err(DriverError::DuplicateModule {
                kind: DriverKind::Phi,
                module: meta.id.to_string(),
            });
        }
        self.phi.insert(meta.id, PhiModule { meta, factory });
        Ok(())
    }

    /// Register an LPI module.
    ///
    /// # Errors
    /// Returns `DriverError::DuplicateModule` if the name is taken.
    pub fn register_lpi(
        &mut self,
        meta: &'static DriverModule,
        factory: LpiFactory,
    ) -> Result<(), DriverError> {
        if self.lpi.contains_key(meta.id) {
            return Err(DriverError::DuplicateModule {
                kind: DriverKind::Lpi,
                module: meta.id.to_string(),
            });
        }
        self.lpi.insert(meta.id, LpiModule { meta, factory });
        Ok(())
    }

    /// Resolve a PHI module for loading.
    ///
    /// # Errors
    /// `ModuleNotFound` for an unknown name, `ApiVersion` when the module
    /// requires a newer host. Both are logged here.
    pub fn resolve_phi(&self, name: &str) -> Result<PhiModule, DriverError> {
        let module = self.phi.get(name).copied().ok_or_else(|| {
            error!("unable to load PHI mod {name}");
            DriverError::ModuleNotFound {
                kind: DriverKind::Phi,
                module: name.to_string(),
            }
        })?;
        self.check(DriverKind::Phi, module.meta)?;
        Ok(module)
    }

    /// Resolve an LPI module for loading. Same rules as [`resolve_phi`](Self::resolve_phi).
    pub fn resolve_lpi(&self, name: &str) -> Result<LpiModule, DriverError> {
        let module = self.lpi.get(name).copied().ok_or_else(|| {
            error!("unable to load LPI mod {name}");
            DriverError::ModuleNotFound {
                kind: DriverKind::Lpi,
                module: name.to_string(),
            }
        })?;
        self.check(DriverKind::Lpi, module.meta)?;
        Ok(module)
    }

    fn check(&self, kind: DriverKind, meta: &DriverModule) -> Result<(), DriverError> {
        info!(
            "{kind} loaded {} v{}, author: {}, license: {}",
            meta.id, meta.version, meta.author, meta.license
        );
        debug!("{}: {}", meta.id, meta.description);
        meta.check_api(self.api_version).inspect_err(|_| {
            error!(
                "unable to activate {kind} {}: controller driver API version is {}, \
                 {kind} driver API version is {}",
                meta.id, self.api_version, meta.api_version
            );
        })
    }

    /// Metadata of every PHI module, sorted by name.
    pub fn list_phi(&self) -> Vec<Value> {
        list(self.phi.values().map(|m| m.meta))
    }

    /// Metadata of every LPI module, sorted by name.
    pub fn list_lpi(&self) -> Vec<Value> {
        list(self.lpi.values().map(|m| m.meta))
    }

    /// Render a module help schema without a live instance.
    ///
    /// # Errors
    /// Returns `DriverError::ModuleNotFound` for an unknown module.
    pub fn module_help(&self, kind: DriverKind, name: &str, helpinfo: &str) -> Result<Value, DriverError> {
        let meta = match kind {
            DriverKind::Phi => self.phi.get(name).map(|m| m.meta),
            DriverKind::Lpi => self.lpi.get(name).map(|m| m.meta),
        };
        meta.map(|m| m.help_by_name(helpinfo))
            .ok_or_else(|| DriverError::ModuleNotFound {
                kind,
                module: name.to_string(),
            })
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn list<'a>(metas: impl Iterator<Item = &'a DriverModule>) -> Vec<Value> {
    let mut metas: Vec<&DriverModule> = metas.collect();
    metas.sort_by_key(|m| m.id);
    metas
        .into_iter()
        .map(|m| {
            let mut d = StateMap::new();
            d.insert("mod".to_string(), Value::from(m.id));
            d.extend(m.info());
            Value::Object(d)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uc_common::driver::{LpiBase, PhiBase};

    static SAMPLE_PHI: DriverModule = DriverModule {
        id: "sample",
        api_version: 3,
        version: "1.0.0",
        ports_help: "1..8",
        ..DriverModule::EMPTY
    };

    static SAMPLE_LPI: DriverModule = DriverModule {
        id: "plain",
        api_version: 1,
        ..DriverModule::EMPTY
    };

    struct SamplePhi {
        base: PhiBase,
    }

    impl Phi for SamplePhi {
        fn base(&self) -> &PhiBase {
            &self.base
        }
    }

    struct PlainLpi {
        base: LpiBase,
    }

    impl Lpi for PlainLpi {
        fn base(&self) -> &LpiBase {
            &self.base
        }
    }

    fn create_phi(init: PhiInit) -> Arc<dyn Phi> {
        Arc::new(SamplePhi {
            base: PhiBase::new(&SAMPLE_PHI, init),
        })
    }

    fn create_lpi(init: LpiInit) -> Arc<dyn Lpi> {
        Arc::new(PlainLpi {
            base: LpiBase::new(&SAMPLE_LPI, init),
        })
    }

    #[test]
    fn registry_register_and_resolve() {
        let mut reg = ModuleRegistry::new();
        reg.register_phi(&SAMPLE_PHI, create_phi).unwrap();
        reg.register_lpi(&SAMPLE_LPI, create_lpi).unwrap();

        assert_eq!(reg.resolve_phi("sample").unwrap().meta.id, "sample");
        assert_eq!(reg.resolve_lpi("plain").unwrap().meta.id, "plain");
    }

    #[test]
    fn registry_module_not_found() {
        let reg = ModuleRegistry::new();
        assert!(matches!(
            reg.resolve_phi("nonexistent"),
            Err(DriverError::ModuleNotFound { kind: DriverKind::Phi, .. })
        ));
        assert!(matches!(
            reg.resolve_lpi("nonexistent"),
            Err(DriverError::ModuleNotFound { kind: DriverKind::Lpi, .. })
        ));
    }

    #[test]
    fn registry_refuses_newer_api() {
        let mut reg = ModuleRegistry::with_api_version(2);
        reg.register_phi(&SAMPLE_PHI, create_phi).unwrap();
        assert!(matches!(
            reg.resolve_phi("sample"),
            Err(DriverError::ApiVersion { declared: 3, supported: 2, .. })
        ));
    }

    #[test]
    fn registry_duplicate_refused() {
        let mut reg = ModuleRegistry::new();
        reg.register_phi(&SAMPLE_PHI, create_phi).unwrap();
        assert!(matches!(
            reg.register_phi(&SAMPLE_PHI, create_phi),
            Err(DriverError::DuplicateModule { .. })
        ));
        // Same name in the other kind is fine.
        reg.register_lpi(&SAMPLE_PHI, create_lpi).unwrap();
    }

    #[test]
    fn registry_list_and_help() {
        let mut reg = ModuleRegistry::new();
        reg.register_phi(&SAMPLE_PHI, create_phi).unwrap();
        let list = reg.list_phi();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["mod"], "sample");
        assert_eq!(list[0]["version"], "1.0.0");

        assert_eq!(
            reg.module_help(DriverKind::Phi, "sample", "ports").unwrap(),
            json!("1..8")
        );
        assert!(reg.module_help(DriverKind::Lpi, "sample", "ports").is_err());
    }

    #[test]
    fn builtin_modules_resolve() {
        let reg = ModuleRegistry::with_builtin().unwrap();
        for name in ["vrtrelay", "vrtsensors"] {
            assert!(reg.resolve_phi(name).is_ok(), "{name}");
        }
        for name in ["basic", "sensor"] {
            assert!(reg.resolve_lpi(name).is_ok(), "{name}");
        }
    }
}
