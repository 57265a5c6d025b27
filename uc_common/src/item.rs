//! Item interface consumed by the driver subsystem.
//!
//! The item model itself lives in the controller. Drivers only need to know
//! which driver an item is bound to (`update_exec`), whether it currently
//! accepts updates, and where to deliver new state.
//!
//! The driver string has the form `|<phi_id>.<rest>`, where `<rest>` is the
//! LPI id, optionally followed by an item-specific suffix.

use crate::driver::StateMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A controllable or observable entity bound to a driver.
pub trait Item: Send + Sync {
    /// Object id, used in log lines.
    fn oid(&self) -> &str;

    /// Full id, unique within the controller.
    fn full_id(&self) -> &str;

    /// Current driver string, if any.
    fn update_exec(&self) -> Option<String>;

    /// Whether the item currently accepts state updates.
    fn updates_allowed(&self) -> bool;

    /// Whether the item has been destroyed.
    fn is_destroyed(&self) -> bool;
}

/// Receiver of driver-originated item updates.
pub trait ItemUpdateSink: Send + Sync {
    /// Deliver `data` to `item`.
    fn update_item(&self, item: &Arc<dyn Item>, data: &StateMap);
}

/// Extract the PHI id from a driver string.
///
/// Returns `None` unless the string starts with `|`, contains a `.` and
/// names a non-empty PHI id.
pub fn update_phi_id(update_exec: &str) -> Option<&str> {
    let rest = update_exec.strip_prefix('|')?;
    let (phi_id, _) = rest.split_once('.')?;
    if phi_id.is_empty() {
        return None;
    }
    Some(phi_id)
}

/// Whether a driver string points at `driver_id` (`phi_id.lpi_id`).
///
/// Matches `|<driver_id>` exactly and `|<driver_id>.<suffix>`.
pub fn references_driver(update_exec: &str, driver_id: &str) -> bool {
    match update_exec.strip_prefix('|') {
        Some(rest) => match rest.strip_prefix(driver_id) {
            Some("") => true,
            Some(suffix) => suffix.starts_with('.'),
            None => false,
        },
        None => false,
    }
}

/// Minimal [`Item`] implementation with mutable flags.
#[derive(Debug)]
pub struct BasicItem {
    oid: String,
    full_id: String,
    update_exec: RwLock<Option<String>>,
    updates_allowed: AtomicBool,
    destroyed: AtomicBool,
}

impl BasicItem {
    /// Create an item of `item_type` (`unit`, `sensor`, ...) bound to `update_exec`.
    pub fn new(item_type: &str, full_id: &str, update_exec: Option<&str>) -> Self {
        Self {
            oid: format!("{item_type}:{full_id}"),
            full_id: full_id.to_string(),
            update_exec: RwLock::new(update_exec.map(str::to_string)),
            updates_allowed: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Rebind the item to another driver string.
    pub fn set_update_exec(&self, update_exec: Option<&str>) {
        *self.update_exec.write() = update_exec.map(str::to_string);
    }

    /// Allow or block updates.
    pub fn set_updates_allowed(&self, allowed: bool) {
        self.updates_allowed.store(allowed, Ordering::SeqCst);
    }

    /// Mark the item destroyed.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

impl Item for BasicItem {
    fn oid(&self) -> &str {
        &self.oid
    }

    fn full_id(&self) -> &str {
        &self.full_id
    }

    fn update_exec(&self) -> Option<String> {
        self.update_exec.read().clone()
    }

    fn updates_allowed(&self) -> bool {
        self.updates_allowed.load(Ordering::SeqCst)
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}
