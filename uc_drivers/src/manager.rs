//! PHI/LPI registries and the driver management surface.
//!
//! `DriverManager` is built once at controller startup and owns every
//! loaded driver instance. Loading the same id again hot-reloads it: the old
//! instance is stopped (not unloaded) and replaced, even while items are
//! still bound to it. Unloading is an operator action and refuses while the
//! driver is in use.
//!
//! Every public method returns `Result`; failures are logged where they are
//! detected and never propagate as panics.
//!
//! Lock order: `phis`, then `lpis`, then the item binding. Subscriber sets
//! are only created, filled or removed while `phis` is held, so a set exists
//! exactly for the loaded PHIs.

use crate::binding::{EventDispatcher, ItemBinding};
use crate::module_registry::ModuleRegistry;
use crate::persistence::{LpiEntry, PhiEntry, Snapshot, SnapshotStore};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uc_common::consts::SNAPSHOT_FILE;
use uc_common::driver::{
    DriverError, DriverKind, EventSink, HostContext, Lpi, LpiInit, Phi, PhiInit, StateMap,
};
use uc_common::item::{Item, ItemUpdateSink, references_driver, update_phi_id};

/// How an LPI is addressed on unload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpiRef<'a> {
    /// By LPI id.
    Id(&'a str),
    /// By composite driver id `<phi_id>.<lpi_id>`.
    Driver(&'a str),
}

#[derive(Default)]
struct LpiTable {
    by_id: BTreeMap<String, Arc<dyn Lpi>>,
    by_driver: BTreeMap<String, Arc<dyn Lpi>>,
}

/// Owner of all loaded PHI and LPI instances.
pub struct DriverManager {
    modules: ModuleRegistry,
    host: Arc<HostContext>,
    binding: ItemBinding,
    events: Arc<dyn EventSink>,
    phis: RwLock<BTreeMap<String, Arc<dyn Phi>>>,
    lpis: RwLock<LpiTable>,
    store: SnapshotStore,
}

impl DriverManager {
    /// Create an empty manager.
    ///
    /// Item updates originating from drivers are delivered to `sink`; the
    /// snapshot file lives in the host's runtime directory.
    pub fn new(
        modules: ModuleRegistry,
        host: Arc<HostContext>,
        sink: Arc<dyn ItemUpdateSink>,
    ) -> Self {
        let binding = ItemBinding::new();
        let events: Arc<dyn EventSink> = Arc::new(EventDispatcher::new(binding.clone(), sink));
        let store = SnapshotStore::new(host.runtime_dir().join(SNAPSHOT_FILE));
        Self {
            modules,
            host,
            binding,
            events,
            phis: RwLock::new(BTreeMap::new()),
            lpis: RwLock::new(LpiTable::default()),
            store,
        }
    }

    /// Available driver modules.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Host services handed to every driver.
    pub fn host(&self) -> &Arc<HostContext> {
        &self.host
    }

    /// Item subscription table.
    pub fn binding(&self) -> &ItemBinding {
        &self.binding
    }

    /// Snapshot store.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    // ─── Loading ────────────────────────────────────────────────────

    /// Load (or hot-reload) a PHI.
    ///
    /// # Errors
    /// `ModuleNotFound`, `ApiVersion` or `NotReady`; nothing is registered
    /// under `phi_id` in that case and a previous instance keeps running.
    pub fn load_phi(
        &self,
        phi_id: &str,
        module: &str,
        config: StateMap,
        start: bool,
    ) -> Result<Arc<dyn Phi>, DriverError> {
        let resolved = self.modules.resolve_phi(module)?;
        let phi = (resolved.factory)(PhiInit {
            phi_id: phi_id.to_string(),
            config,
            host: Arc::clone(&self.host),
            events: Arc::clone(&self.events),
        });
        if !phi.base().is_ready() {
            error!("unable to init PHI mod {module}");
            return Err(DriverError::NotReady {
                kind: DriverKind::Phi,
                module: module.to_string(),
            });
        }

        {
            let mut phis = self.phis.write();
            if let Some(old) = phis.get(phi_id) {
                info!("PHI {phi_id}: stopping previous instance");
                old.halt();
            }
            phis.insert(phi_id.to_string(), Arc::clone(&phi));
            self.binding.ensure(phi_id);
        }
        info!("PHI {phi_id} loaded, mod: {module}");

        if start && !phi.launch() {
            warn!("PHI {phi_id}: start failed");
        }
        Ok(phi)
    }

    /// Load (or hot-reload) an LPI bound to an already loaded PHI.
    ///
    /// # Errors
    /// `UnknownPhi` when `phi_id` is not loaded, otherwise as
    /// [`load_phi`](Self::load_phi).
    pub fn load_lpi(
        &self,
        lpi_id: &str,
        module: &str,
        phi_id: &str,
        config: StateMap,
        start: bool,
    ) -> Result<Arc<dyn Lpi>, DriverError> {
        if self.get_phi(phi_id).is_none() {
            error!("unable to load LPI {lpi_id}, unknown PHI: {phi_id}");
            return Err(DriverError::UnknownPhi(phi_id.to_string()));
        }
        let resolved = self.modules.resolve_lpi(module)?;
        let lpi = (resolved.factory)(LpiInit {
            lpi_id: lpi_id.to_string(),
            phi_id: phi_id.to_string(),
            config,
            host: Arc::clone(&self.host),
        });
        if !lpi.base().is_ready() {
            error!("unable to init LPI mod {module}");
            return Err(DriverError::NotReady {
                kind: DriverKind::Lpi,
                module: module.to_string(),
            });
        }

        {
            let mut lpis = self.lpis.write();
            if let Some(old) = lpis.by_id.remove(lpi_id) {
                info!("LPI {}: stopping previous instance", old.base().driver_id());
                old.stop();
                lpis.by_driver.remove(old.base().driver_id());
            }
            lpis.by_id.insert(lpi_id.to_string(), Arc::clone(&lpi));
            lpis.by_driver
                .insert(lpi.base().driver_id().to_string(), Arc::clone(&lpi));
        }
        info!("LPI {} loaded, mod: {module}", lpi.base().driver_id());

        if start && !lpi.start() {
            warn!("LPI {}: start failed", lpi.base().driver_id());
        }
        Ok(lpi)
    }

    /// Hot-reload a PHI with the same module and a new configuration.
    pub fn modify_phi(&self, phi_id: &str, config: StateMap) -> Result<Arc<dyn Phi>, DriverError> {
        let phi = self
            .get_phi(phi_id)
            .ok_or_else(|| DriverError::UnknownPhi(phi_id.to_string()))?;
        let module = phi.base().module().id;
        self.load_phi(phi_id, module, config, true)
    }

    // ─── Unloading ──────────────────────────────────────────────────

    /// Stop and remove a PHI.
    ///
    /// # Errors
    /// `UnknownPhi`, or `PhiBusy` while an LPI is bound to it or items are
    /// subscribed to it. The registry is unchanged on error.
    pub fn unload_phi(&self, phi_id: &str) -> Result<(), DriverError> {
        let phi = {
            let mut phis = self.phis.write();
            if !phis.contains_key(phi_id) {
                return Err(DriverError::UnknownPhi(phi_id.to_string()));
            }

            let lpis: Vec<String> = self
                .lpis
                .read()
                .by_id
                .iter()
                .filter(|(_, lpi)| lpi.base().phi_id() == phi_id)
                .map(|(lpi_id, _)| lpi_id.clone())
                .collect();
            for lpi_id in &lpis {
                error!("unable to unload PHI {phi_id}, it is in use by LPI {lpi_id}");
            }
            let items = self.binding.subscriber_count(phi_id);
            if items > 0 {
                error!("unable to unload PHI {phi_id}, it is in use by {items} item(s)");
            }
            if !lpis.is_empty() || items > 0 {
                return Err(DriverError::PhiBusy {
                    phi_id: phi_id.to_string(),
                    lpis,
                    items,
                });
            }

            self.binding.remove(phi_id);
            phis.remove(phi_id)
        };
        if let Some(phi) = phi {
            phi.halt();
        }
        info!("PHI {phi_id} unloaded");
        Ok(())
    }

    /// Stop and remove an LPI.
    ///
    /// The busy-check scans the items subscribed to the LPI's PHI and
    /// refuses while any of them names the LPI's driver id. Items bound to
    /// the driver id but not registered for updates are not seen.
    ///
    /// # Errors
    /// `UnknownLpi`, or `LpiBusy` naming the referencing items.
    pub fn unload_lpi(&self, lpi: LpiRef<'_>) -> Result<(), DriverError> {
        let removed = {
            let mut lpis = self.lpis.write();
            let found = match lpi {
                LpiRef::Id(id) => lpis.by_id.get(id),
                LpiRef::Driver(id) => lpis.by_driver.get(id),
            };
            let Some(found) = found.cloned() else {
                let id = match lpi {
                    LpiRef::Id(id) | LpiRef::Driver(id) => id,
                };
                return Err(DriverError::UnknownLpi(id.to_string()));
            };

            let driver_id = found.base().driver_id();
            let items: Vec<String> = self
                .binding
                .subscribers(found.base().phi_id())
                .into_iter()
                .filter(|item| {
                    item.update_exec()
                        .is_some_and(|u| references_driver(&u, driver_id))
                })
                .map(|item| item.full_id().to_string())
                .collect();
            if !items.is_empty() {
                for item in &items {
                    error!("unable to unload driver {driver_id}, it is in use by {item}");
                }
                return Err(DriverError::LpiBusy {
                    driver_id: driver_id.to_string(),
                    items,
                });
            }

            lpis.by_id.remove(found.base().lpi_id());
            lpis.by_driver.remove(driver_id);
            found
        };
        removed.stop();
        info!("LPI {} unloaded", removed.base().driver_id());
        Ok(())
    }

    // ─── Lookups ────────────────────────────────────────────────────

    /// PHI by id.
    pub fn get_phi(&self, phi_id: &str) -> Option<Arc<dyn Phi>> {
        self.phis.read().get(phi_id).cloned()
    }

    /// LPI by LPI id.
    pub fn get_lpi(&self, lpi_id: &str) -> Option<Arc<dyn Lpi>> {
        self.lpis.read().by_id.get(lpi_id).cloned()
    }

    /// LPI by composite driver id.
    pub fn get_driver(&self, driver_id: &str) -> Option<Arc<dyn Lpi>> {
        self.lpis.read().by_driver.get(driver_id).cloned()
    }

    /// Ids of all loaded PHIs, sorted.
    pub fn phi_ids(&self) -> Vec<String> {
        self.phis.read().keys().cloned().collect()
    }

    /// Driver ids of all loaded LPIs, sorted.
    pub fn driver_ids(&self) -> Vec<String> {
        self.lpis.read().by_driver.keys().cloned().collect()
    }

    // ─── Item binding ───────────────────────────────────────────────

    /// Subscribe `item` to the events of the PHI its driver string names.
    ///
    /// # Errors
    /// `InvalidUpdateSource` for a malformed driver string, `UnknownPhi`
    /// when the PHI is not loaded. The item stays unsubscribed.
    pub fn register_item_update(&self, item: &Arc<dyn Item>) -> Result<(), DriverError> {
        let update_exec = item.update_exec();
        let Some(phi_id) = update_exec.as_deref().and_then(update_phi_id) else {
            error!(
                "unable to register item {} for the driver events, invalid driver str: {:?}",
                item.oid(),
                update_exec
            );
            return Err(DriverError::InvalidUpdateSource {
                item: item.full_id().to_string(),
                update_exec,
            });
        };
        // `phis` stays locked until the item is subscribed.
        let phis = self.phis.read();
        if !phis.contains_key(phi_id) {
            error!(
                "unable to register item {} for the driver events, no such PHI: {phi_id}",
                item.oid()
            );
            return Err(DriverError::UnknownPhi(phi_id.to_string()));
        }
        self.binding.subscribe(phi_id, Arc::clone(item));
        drop(phis);
        debug!("item {} registered for driver updates, PHI: {phi_id}", item.full_id());
        Ok(())
    }

    /// Inverse of [`register_item_update`](Self::register_item_update).
    /// An item that is not subscribed is a no-op.
    ///
    /// # Errors
    /// `InvalidUpdateSource` for a malformed driver string.
    pub fn unregister_item_update(&self, item: &dyn Item) -> Result<(), DriverError> {
        let update_exec = item.update_exec();
        let Some(phi_id) = update_exec.as_deref().and_then(update_phi_id) else {
            error!(
                "unable to unregister item {} from the driver events, invalid driver str: {:?}",
                item.oid(),
                update_exec
            );
            return Err(DriverError::InvalidUpdateSource {
                item: item.full_id().to_string(),
                update_exec,
            });
        };
        if self.binding.unsubscribe(phi_id, item.full_id()) {
            debug!("item {} unregistered from driver updates, PHI: {phi_id}", item.full_id());
        }
        Ok(())
    }

    /// Route a hardware event of `phi_id` to its subscribed items.
    pub fn handle_phi_event(&self, phi_id: &str, port: &str, data: &StateMap) {
        self.events.handle_phi_event(phi_id, port, data);
    }

    // ─── Introspection & persistence ────────────────────────────────

    /// Serialize both registries as `{"phi": [...], "lpi": [...]}`.
    ///
    /// An instance that fails to serialize is logged and left out.
    pub fn serialize(&self, full: bool, config: bool) -> Value {
        let phis: Vec<(String, Arc<dyn Phi>)> = self
            .phis
            .read()
            .iter()
            .map(|(id, phi)| (id.clone(), Arc::clone(phi)))
            .collect();
        let lpis: Vec<(String, Arc<dyn Lpi>)> = self
            .lpis
            .read()
            .by_id
            .iter()
            .map(|(id, lpi)| (id.clone(), Arc::clone(lpi)))
            .collect();

        let phi: Vec<Value> = phis
            .iter()
            .filter_map(|(id, phi)| {
                isolate(DriverKind::Phi, id, || phi.serialize(full, config, None))
            })
            .collect();
        let lpi: Vec<Value> = lpis
            .iter()
            .filter_map(|(id, lpi)| {
                isolate(DriverKind::Lpi, id, || lpi.serialize(full, config, None))
            })
            .collect();
        json!({ "phi": phi, "lpi": lpi })
    }

    /// Full serialization with configs, for diagnostics dumps.
    pub fn dump(&self) -> Value {
        self.serialize(true, true)
    }

    /// The current driver set as a snapshot.
    pub fn snapshot(&self) -> Snapshot {
        let data = self.serialize(false, true);
        Snapshot {
            phi: entries::<PhiEntry>(DriverKind::Phi, &data["phi"]),
            lpi: entries::<LpiEntry>(DriverKind::Lpi, &data["lpi"]),
        }
    }

    /// Write the driver set to the snapshot file.
    pub fn save(&self) -> Result<(), DriverError> {
        self.store.save(&self.snapshot()).inspect_err(|e| {
            error!("unable to save driver state: {e}");
        })
    }

    /// Restore the driver set from the snapshot file without starting it.
    ///
    /// PHIs are loaded before LPIs. An entry that fails to load is logged
    /// and skipped; an LPI whose PHI is absent is skipped as well.
    ///
    /// # Errors
    /// Only an unreadable snapshot file is an error.
    pub fn load(&self) -> Result<(), DriverError> {
        let snapshot = match self.store.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!("unable to load {}: {e}", SNAPSHOT_FILE);
                return Err(e);
            }
        };
        self.restore(snapshot);
        Ok(())
    }

    /// Load every entry of `snapshot` without starting anything.
    ///
    /// Returns the number of PHIs and LPIs loaded.
    pub fn restore(&self, snapshot: Snapshot) -> (usize, usize) {
        let mut phi_count = 0;
        for entry in snapshot.phi {
            if self
                .load_phi(&entry.id, &entry.module, entry.cfg, false)
                .is_ok()
            {
                phi_count += 1;
            }
        }
        let mut lpi_count = 0;
        for entry in snapshot.lpi {
            if self.get_phi(&entry.phi_id).is_none() {
                error!(
                    "LPI {}.{} skipped, PHI {} is not loaded",
                    entry.phi_id, entry.lpi_id, entry.phi_id
                );
                continue;
            }
            if self
                .load_lpi(&entry.lpi_id, &entry.module, &entry.phi_id, entry.cfg, false)
                .is_ok()
            {
                lpi_count += 1;
            }
        }
        info!("restored {phi_count} PHI(s), {lpi_count} LPI(s)");
        (phi_count, lpi_count)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Start every loaded instance, PHIs first, then mark the host as
    /// started. PHIs loaded afterwards publish their state on launch.
    pub fn start(&self) {
        let phis: Vec<(String, Arc<dyn Phi>)> = self
            .phis
            .read()
            .iter()
            .map(|(id, phi)| (id.clone(), Arc::clone(phi)))
            .collect();
        for (phi_id, phi) in phis {
            if !phi.launch() {
                warn!("PHI {phi_id}: start failed");
            }
        }
        let lpis: Vec<Arc<dyn Lpi>> = self.lpis.read().by_id.values().cloned().collect();
        for lpi in lpis {
            if !lpi.start() {
                warn!("LPI {}: start failed", lpi.base().driver_id());
            }
        }
        self.host.set_started(true);
    }

    /// Stop every loaded instance, LPIs first. Instances stay registered.
    pub fn stop(&self) {
        self.host.set_started(false);
        let lpis: Vec<Arc<dyn Lpi>> = self.lpis.read().by_id.values().cloned().collect();
        for lpi in lpis {
            lpi.stop();
        }
        let phis: Vec<Arc<dyn Phi>> = self.phis.read().values().cloned().collect();
        for phi in phis {
            phi.halt();
        }
    }

    // ─── Driver commands ────────────────────────────────────────────

    /// Run a PHI self test / debug command.
    pub fn test_phi(&self, phi_id: &str, cmd: &str) -> Result<Value, DriverError> {
        let phi = self
            .get_phi(phi_id)
            .ok_or_else(|| DriverError::UnknownPhi(phi_id.to_string()))?;
        Ok(phi.test(cmd))
    }

    /// Run an equipment-specific PHI command.
    pub fn exec_phi(&self, phi_id: &str, cmd: &str, args: Option<&str>) -> Result<Value, DriverError> {
        let phi = self
            .get_phi(phi_id)
            .ok_or_else(|| DriverError::UnknownPhi(phi_id.to_string()))?;
        Ok(phi.exec(cmd, args))
    }

    /// Item-level state of `port` through the LPI `driver_id`.
    pub fn lpi_state(&self, driver_id: &str, port: &str) -> Result<Option<Value>, DriverError> {
        let (lpi, phi) = self.driver_pair(driver_id)?;
        Ok(lpi.state(&*phi, port, self.host.timeout()))
    }

    /// Item-level action on `port` through the LPI `driver_id`.
    pub fn lpi_action(&self, driver_id: &str, port: &str, value: &Value) -> Result<bool, DriverError> {
        let (lpi, phi) = self.driver_pair(driver_id)?;
        Ok(lpi.action(&*phi, port, value, self.host.timeout()))
    }

    fn driver_pair(&self, driver_id: &str) -> Result<(Arc<dyn Lpi>, Arc<dyn Phi>), DriverError> {
        let lpi = self
            .get_driver(driver_id)
            .ok_or_else(|| DriverError::UnknownLpi(driver_id.to_string()))?;
        let phi = self
            .get_phi(lpi.base().phi_id())
            .ok_or_else(|| DriverError::UnknownPhi(lpi.base().phi_id().to_string()))?;
        Ok((lpi, phi))
    }
}

/// Run one instance's serialization, logging and dropping any failure.
fn isolate<F>(kind: DriverKind, id: &str, f: F) -> Option<Value>
where
    F: FnOnce() -> Result<Value, DriverError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("{kind} {id} serialize error: {e}");
            None
        }
        Err(_) => {
            error!("{kind} {id} serialize error: panicked");
            None
        }
    }
}

fn entries<T: DeserializeOwned>(kind: DriverKind, list: &Value) -> Vec<T> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match serde_json::from_value(item.clone()) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        error!("{kind} entry {item} can not be saved: {e}");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}
