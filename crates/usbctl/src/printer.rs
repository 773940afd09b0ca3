//! Human-readable rendering of devices and batch results
//!
//! Everything here writes to a caller-supplied `Write`, normally stdout.

use crate::executor::{BatchReport, OperationResult, OperationStatus};
use crate::usb::descriptor::{AltSetting, ConfigDescriptor, EndpointDescriptor};
use crate::usb::snapshot::DeviceSnapshot;
use crate::usb::transfers::DeviceStrings;
use std::io::{self, Write};

/// `[VVVV/PPPP] Manufacturer :: Product`, leaving out unknown strings
pub fn device_label(snapshot: &DeviceSnapshot, strings: &DeviceStrings) -> String {
    let mut label = format!("[{:04X}/{:04X}]", snapshot.vendor_id(), snapshot.product_id());
    if let Some(manufacturer) = &strings.manufacturer {
        label.push(' ');
        label.push_str(manufacturer);
    }
    if let Some(product) = &strings.product {
        label.push_str(" :: ");
        label.push_str(product);
    }
    label
}

/// Print one device
///
/// The header line is always printed. With `verbosity > 0` the serial
/// number and the whole configuration tree follow.
pub fn print_device(
    out: &mut dyn Write,
    snapshot: &DeviceSnapshot,
    strings: &DeviceStrings,
    verbosity: u8,
) -> io::Result<()> {
    let location = snapshot.location;
    writeln!(
        out,
        "Bus: {} Device: {} Dev#{} {}",
        location.bus_dir(),
        location.device_file(),
        location.address,
        device_label(snapshot, strings)
    )?;

    if verbosity == 0 {
        return Ok(());
    }

    if let Some(serial) = &strings.serial_number {
        writeln!(out, "  - Serial Number: {}", serial)?;
    }

    let descriptor = &snapshot.descriptor;
    if descriptor.configurations.is_empty() {
        writeln!(out, "  Couldn't retrieve descriptors")?;
        return Ok(());
    }

    writeln!(out, "  bcdUSB:               {}", descriptor.usb_version)?;
    writeln!(out, "  bcdDevice:            {}", descriptor.release)?;
    writeln!(out, "  bDeviceClass:         {}", descriptor.class_code)?;
    writeln!(out, "  bNumConfigurations:   {}", descriptor.num_configurations)?;

    for config in &descriptor.configurations {
        print_configuration(out, config)?;
    }
    Ok(())
}

fn print_configuration(out: &mut dyn Write, config: &ConfigDescriptor) -> io::Result<()> {
    writeln!(out, "  bNumInterfaces:       {}", config.num_interfaces())?;
    writeln!(out, "  bConfigurationValue:  {}", config.number)?;
    writeln!(out, "  iConfiguration:       {}", config.description_index.unwrap_or(0))?;
    writeln!(out, "  bmAttributes:         {:02x}h", config.attributes)?;
    writeln!(out, "  MaxPower:             {}mA", config.max_power_ma)?;

    for interface in &config.interfaces {
        for alt in &interface.alt_settings {
            print_alt_setting(out, alt)?;
        }
    }
    Ok(())
}

fn print_alt_setting(out: &mut dyn Write, alt: &AltSetting) -> io::Result<()> {
    writeln!(out, "    bInterfaceNumber:   {}", alt.interface_number)?;
    writeln!(out, "    bAlternateSetting:  {}", alt.setting_number)?;
    writeln!(out, "    bNumEndpoints:      {}", alt.endpoints.len())?;
    writeln!(out, "    bInterfaceClass:    {}", alt.class_code)?;
    writeln!(out, "    bInterfaceSubClass: {}", alt.sub_class_code)?;
    writeln!(out, "    bInterfaceProtocol: {}", alt.protocol_code)?;
    writeln!(out, "    iInterface:         {}", alt.description_index.unwrap_or(0))?;

    for endpoint in &alt.endpoints {
        print_endpoint(out, endpoint)?;
    }
    Ok(())
}

fn print_endpoint(out: &mut dyn Write, endpoint: &EndpointDescriptor) -> io::Result<()> {
    writeln!(out, "      bEndpointAddress: {:02x}h", endpoint.address)?;
    writeln!(out, "      bmAttributes:     {:02x}h", endpoint.attributes)?;
    writeln!(out, "      wMaxPacketSize:   {}", endpoint.max_packet_size)?;
    writeln!(out, "      bInterval:        {}", endpoint.interval)?;
    writeln!(out, "      bRefresh:         {}", endpoint.refresh)?;
    writeln!(out, "      bSynchAddress:    {}", endpoint.synch_address)
}

/// One line per device outcome
pub fn print_result(out: &mut dyn Write, result: &OperationResult) -> io::Result<()> {
    match &result.status {
        OperationStatus::Succeeded { detail } => writeln!(
            out,
            "{} [{:04X}/{:04X}] {}: ok ({})",
            result.location, result.vendor_id, result.product_id, result.operation, detail
        ),
        OperationStatus::Failed { kind, message } => writeln!(
            out,
            "{} [{:04X}/{:04X}] {}: failed ({:?}): {}",
            result.location, result.vendor_id, result.product_id, result.operation, kind, message
        ),
    }
}

pub fn print_summary(out: &mut dyn Write, report: &BatchReport) -> io::Result<()> {
    writeln!(
        out,
        "{} device(s): {} succeeded, {} failed",
        report.results.len(),
        report.succeeded(),
        report.failed()
    )
}
