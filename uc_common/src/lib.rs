//! UC Common Library
//!
//! Shared contract between the controller host and its hardware drivers.
//!
//! # Module Structure
//!
//! - [`driver`] - PHI/LPI driver traits, base behavior, capability model, errors
//! - [`item`] - Item interface consumed by the driver subsystem
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - API version and default timings
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust,ignore
//! use uc_common::prelude::*;
//!
//! static MODULE: DriverModule = DriverModule { /* ... */ };
//!
//! struct MyPhi { base: PhiBase }
//!
//! impl Phi for MyPhi {
//!     fn base(&self) -> &PhiBase { &self.base }
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod consts;
pub mod driver;
pub mod item;
pub mod prelude;
