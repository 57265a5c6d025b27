//! # UC Drivers Library
//!
//! Device driver subsystem of the controller: PHI/LPI registries with
//! busy-checked unload, item binding, event dispatch and snapshot
//! persistence of the loaded driver set.
//!
//! Drivers implement the `Phi` / `Lpi` traits defined in `uc_common::driver`.
//!
//! # Module Structure
//!
//! - [`module_registry`] - Module lookup and API version check
//! - [`manager`] - PHI/LPI registries and the management surface
//! - [`binding`] - Item subscriptions and event dispatch
//! - [`persistence`] - Driver set snapshot file
//! - [`controller`] - Controller process wiring
//! - [`drivers`] - Built-in driver modules
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         DriverManager                            │
//! │  ┌────────────────┐   ┌──────────────┐   ┌───────────────────┐   │
//! │  │ ModuleRegistry │──►│ PHI registry │◄──│   LPI registry    │   │
//! │  │  (api check)   │   │ phi_id → PHI │   │ lpi_id/driver_id  │   │
//! │  └────────────────┘   └──────┬───────┘   └───────────────────┘   │
//! │                              │ update pipeline (per PHI)         │
//! │                              ▼                                   │
//! │                     ┌─────────────────┐    ┌─────────────────┐   │
//! │                     │ EventDispatcher │───►│ ItemUpdateSink  │   │
//! │                     │ (ItemBinding)   │    │  (item model)   │   │
//! │                     └─────────────────┘    └─────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod binding;
pub mod controller;
pub mod drivers;
pub mod manager;
pub mod module_registry;
pub mod persistence;

// Re-export key types for convenience
pub use crate::binding::{EventDispatcher, ItemBinding};
pub use crate::controller::Controller;
pub use crate::manager::{DriverManager, LpiRef};
pub use crate::module_registry::{LpiModule, ModuleRegistry, PhiModule};
pub use crate::persistence::{LpiEntry, PhiEntry, Snapshot, SnapshotStore};
