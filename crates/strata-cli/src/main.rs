//! Strata - Discover accelerators and bring up their devices
//!
//! Resolves debug settings, runs the device factory and prints what was built.

mod config;
mod report;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use strata_core::BuiltinCatalog;
use strata_discovery::{DeviceFactory, DrmDiscovery};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::SettingsOverrides;
use crate::report::DeviceReport;

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Accelerator discovery and device bring-up")]
#[command(version)]
struct Args {
    /// Path to debug settings file
    #[arg(short, long, default_value = "strata.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Directory holding the DRM `by-path` render nodes
    #[arg(long, default_value = strata_discovery::os::DEFAULT_DRI_ROOT)]
    dri_root: PathBuf,

    /// Product catalog replacing the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Print the device report as JSON
    #[arg(long)]
    json: bool,

    /// Receiver type (0 hw, 1 aub, 2 tbx, 3 hw+aub, 4 tbx+aub)
    #[arg(long)]
    csr: Option<i32>,

    /// Product family for simulated devices
    #[arg(long)]
    product: Option<String>,

    /// Hw config `SxUxE` or `default`
    #[arg(long)]
    hw_config: Option<String>,

    /// Number of simulated root devices
    #[arg(long)]
    root_devices: Option<u32>,

    /// Sub-device count override
    #[arg(long)]
    sub_devices: Option<u32>,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            command_stream_receiver: self.csr,
            product_family: self.product.clone(),
            hardware_info: self.hw_config.clone(),
            root_devices: self.root_devices,
            sub_devices: self.sub_devices,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Strata v{}", env!("CARGO_PKG_VERSION"));

    let settings = config::load_settings(&args.config, &args.overrides())?;

    let mut factory = DeviceFactory::new(settings)
        .with_os_discovery(Arc::new(DrmDiscovery::new(&args.dri_root)));
    if let Some(path) = &args.catalog {
        let catalog = BuiltinCatalog::from_file(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?;
        factory = factory.with_catalog(Arc::new(catalog));
    }

    info!(mode = ?factory.discovery_mode(), "Discovering devices");
    let devices = factory.create_devices(factory.new_execution_environment());
    let reports: Vec<DeviceReport> = devices.iter().map(DeviceReport::from_device).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("Created {} root devices:", reports.len());
        for report in &reports {
            println!("  - {}", report.summary());
        }
    }

    if devices.is_empty() {
        bail!("No devices were created");
    }
    Ok(())
}
