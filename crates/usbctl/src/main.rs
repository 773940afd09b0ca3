//! usbctl
//!
//! Command line front end: parses arguments, loads configuration, sets up
//! logging and hands a structured request to the dispatcher.

use anyhow::{Context, Result};
use clap::Parser;
use common::{level_for_verbosity, setup_logging};
use std::io::{self, Write};
use tracing::{debug, error, warn};
use usbctl::config::{UsbctlConfig, expand_path, parse_hex_id};
use usbctl::usb::driver::platform_supports_detach;
use usbctl::usb::{RusbHost, Topology, select_driver_support};
use usbctl::{BatchReport, CommandRequest, Dispatcher, printer};

#[derive(Parser, Debug)]
#[command(name = "usbctl")]
#[command(author, version, about = "Probe or reset USB devices by vendor/product id")]
#[command(long_about = "
Finds attached USB devices matching a vendor/product filter and runs one
operation on each: display descriptors, send a vendor GET_STATUS probe, or
issue a bus reset. A failure on one device never stops the others.

EXAMPLES:
    # Show every device
    usbctl show

    # Show all devices of one vendor, with descriptors
    usbctl show --vid 0xE6E6 -v

    # Reset one exact device model
    usbctl reset --vid 0xE6E6 --pid 0x0201

    # Probe the device at bus 1, address 4
    usbctl status --device 001/004

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usbctl/usbctl.toml
    3. /etc/usbctl/usbctl.toml
    4. Built-in defaults
")]
struct Args {
    /// Command to run: display (or show), status, reset
    #[arg(required_unless_present = "save_config")]
    command: Option<String>,

    /// Increase verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Device location as BUS/DEVICE, e.g. 001/004
    #[arg(short, long, value_name = "BUS/DEV", env = "USBCTL_DEVICE")]
    device: Option<String>,

    /// Vendor id filter (hex)
    #[arg(long = "vid", value_name = "HEX", value_parser = parse_hex_id)]
    vendor: Option<u16>,

    /// Product id filter (hex)
    #[arg(long = "pid", value_name = "HEX", value_parser = parse_hex_id)]
    product: Option<u16>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = UsbctlConfig::default();
        let path = UsbctlConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let (config, fallback) = if let Some(ref path) = args.config {
        let config = UsbctlConfig::load(Some(expand_path(path)))
            .context("Failed to load configuration")?;
        (config, None)
    } else {
        UsbctlConfig::load_or_default()
    };

    let configured_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);
    let log_level = level_for_verbosity(args.verbose, configured_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    debug!("usbctl v{}", env!("CARGO_PKG_VERSION"));
    if let Some(reason) = fallback {
        warn!("{:#}, using defaults", reason);
    }

    let request = build_request(&args, &config)?;

    // Reject bad commands before the USB subsystem is even initialised
    if let Err(e) = request.operation() {
        error!("{}", e);
        return Err(e.into());
    }

    let host = RusbHost::new().context("Failed to initialize USB subsystem")?;
    let drivers =
        select_driver_support(config.usb.detach_kernel_driver, platform_supports_detach());
    debug!("Kernel driver support: {}", drivers.name());

    let dispatcher = Dispatcher::new(&host, &*drivers);
    let mut topology = Topology::new();
    let mut out = io::stdout().lock();

    let report = dispatcher
        .dispatch(&request, &mut topology, &mut out)
        .inspect_err(|e| error!("{}", e))?;

    // The batch has run; neither device failures nor a closed stdout
    // change the exit status from here on
    if let Err(e) = print_report(&mut out, &report) {
        warn!("Could not write results: {}", e);
    }
    Ok(())
}

fn print_report(out: &mut dyn Write, report: &BatchReport) -> io::Result<()> {
    for result in &report.results {
        printer::print_result(out, result)?;
    }
    printer::print_summary(out, report)?;
    out.flush()
}

/// Merge command line arguments with configured defaults
fn build_request(args: &Args, config: &UsbctlConfig) -> Result<CommandRequest> {
    let defaults = config.default_filter()?;

    Ok(CommandRequest {
        command: args.command.clone().unwrap_or_default(),
        verbosity: args.verbose,
        device_location: args
            .device
            .clone()
            .or_else(|| config.usb.default_device.clone()),
        vendor_id: Some(args.vendor.unwrap_or(defaults.vendor_id)),
        product_id: Some(args.product.unwrap_or(defaults.product_id)),
    })
}
