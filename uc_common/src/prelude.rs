//! Prelude module for common re-exports.
//!
//! Driver modules can do `use uc_common::prelude::*;` and get the driver
//! contract without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use uc_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, ControllerConfig, DriverApiConfig, LogLevel};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::DRIVER_API_VERSION;

// ─── Driver contract ────────────────────────────────────────────────
pub use crate::driver::{
    DriverError, DriverKind, DriverModule, EventSink, HelpEntry, HostContext, Lpi, LpiBase,
    LpiInit, Phi, PhiBase, PhiInit, PortSpec, StateMap,
};
pub use crate::driver::params::{cfg_bool, cfg_f64, cfg_i64, value_f64, value_i64};

// ─── Items ──────────────────────────────────────────────────────────
pub use crate::item::{Item, ItemUpdateSink};
