//! # UC Drivers Binary
//!
//! Runs the device driver subsystem of a controller and inspects the
//! available driver modules.
//!
//! # Usage
//!
//! ```bash
//! # Run with a controller config (restores and saves runtime/uc_drivers.json)
//! uc_drivers --config /etc/uc/uc.toml run
//!
//! # List available modules
//! uc_drivers modules
//!
//! # Render a module help schema
//! uc_drivers help vrtrelay cfg
//! uc_drivers help basic cfg --lpi
//!
//! # Verbose logging
//! uc_drivers -v run
//! ```

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;
use uc_common::driver::DriverKind;
use uc_drivers::controller::{Controller, LoggingUpdateSink};
use uc_drivers::module_registry::ModuleRegistry;

/// UC Drivers - device driver subsystem of the controller
#[derive(Parser, Debug)]
#[command(name = "uc_drivers")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Device driver subsystem: PHI/LPI drivers, item binding, snapshot persistence")]
#[command(long_about = None)]
struct Args {
    /// Path to the controller configuration file.
    #[arg(short, long, default_value = "/etc/uc/uc.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore the driver set, start it and run until interrupted (default).
    Run,
    /// Print every available driver module as JSON.
    Modules,
    /// Print a module help schema as JSON.
    Help {
        /// Module name.
        module: String,
        /// Schema: cfg, get, set, ports or discover.
        kind: String,
        /// Look the module up among LPI modules.
        #[arg(long)]
        lpi: bool,
    },
}

fn main() {
    if let Err(e) = run() {
        error!("uc_drivers failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    setup_tracing(&args);

    let modules = ModuleRegistry::with_builtin()?;

    match args.command.unwrap_or(Command::Run) {
        Command::Modules => {
            let list = json!({"phi": modules.list_phi(), "lpi": modules.list_lpi()});
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        Command::Help { module, kind, lpi } => {
            let kind_of = if lpi { DriverKind::Lpi } else { DriverKind::Phi };
            let help = modules.module_help(kind_of, &module, &kind)?;
            println!("{}", serde_json::to_string_pretty(&help)?);
        }
        Command::Run => {
            info!("UC Drivers v{} starting...", env!("CARGO_PKG_VERSION"));
            let config = Controller::load_config(&args.config)?;
            let controller = Controller::new(config, modules, Arc::new(LoggingUpdateSink))?;

            let running = controller.running_flag();
            ctrlc::set_handler(move || {
                info!("Received shutdown signal");
                running.store(false, Ordering::SeqCst);
            })?;

            controller.init()?;
            controller.run();
            controller.shutdown()?;
            info!("UC Drivers shutdown complete");
        }
    }
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
