//! System-wide constants for the driver subsystem.
//!
//! Single source of truth for the driver API version and default timings.

/// Driver API version implemented by this host.
///
/// Modules declaring a higher `api_version` are refused at load time.
pub const DRIVER_API_VERSION: u32 = 5;

/// Default equipment timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

/// Default controller idle loop delay in seconds.
pub const DEFAULT_POLL_DELAY_SECS: f64 = 0.1;

/// Default scheduler sleep granularity in seconds.
pub const DEFAULT_SLEEP_STEP_SECS: f64 = 0.1;

/// Default runtime directory (holds the driver snapshot).
pub const DEFAULT_RUNTIME_DIR: &str = "runtime";

/// Driver snapshot file name inside the runtime directory.
pub const SNAPSHOT_FILE: &str = "uc_drivers.json";

/// Port name reported for events published by the update scheduler.
pub const SCHEDULER_PORT: &str = "scheduler";
