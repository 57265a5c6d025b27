//! Built-in driver modules.
//!
//! PHI modules:
//!
//! - [`vrtrelay`] - Virtual 16-port relay
//! - [`vrtsensors`] - Virtual sensors
//!
//! LPI modules:
//!
//! - [`basic`] - Unit status mapped onto a single port
//! - [`sensor`] - Sensor value pass-through
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/` with a `static MODULE: DriverModule`
//! 2. Implement `Phi` or `Lpi` from `uc_common::driver`
//! 3. Register the module in [`register_all`]

pub mod basic;
pub mod sensor;
pub mod vrtrelay;
pub mod vrtsensors;

use crate::module_registry::ModuleRegistry;
use uc_common::driver::DriverError;

/// Register every built-in module.
pub fn register_all(registry: &mut ModuleRegistry) -> Result<(), DriverError> {
    registry.register_phi(&vrtrelay::MODULE, vrtrelay::create)?;
    registry.register_phi(&vrtsensors::MODULE, vrtsensors::create)?;

    registry.register_lpi(&basic::MODULE, basic::create)?;
    registry.register_lpi(&sensor::MODULE, sensor::create)?;
    Ok(())
}
