//! Host USB subsystem access
//!
//! [`UsbHost`] and [`UsbSession`] are the seam between the device logic and
//! libusb. [`RusbHost`] is the real implementation on top of `rusb`; tests
//! use the in-memory doubles from [`crate::test_utils`].

use crate::error::UsbctlError;
use crate::usb::descriptor::{
    AltSetting, BcdVersion, ConfigDescriptor, DeviceDescriptor, DeviceLocation,
    EndpointDescriptor, InterfaceDescriptor,
};
use rusb::{Context, Device, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// A device as seen during one enumeration pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub location: DeviceLocation,
    pub descriptor: DeviceDescriptor,
}

/// An open low-level session on one device
///
/// The session is closed when it is dropped.
pub trait UsbSession {
    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool>;
    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()>;
    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()>;
    fn release_interface(&mut self, interface: u8) -> rusb::Result<()>;
    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;
    fn reset(&mut self) -> rusb::Result<()>;
    fn read_string_ascii(&self, index: u8) -> rusb::Result<String>;
}

/// The host's view of the bus
pub trait UsbHost {
    type Session: UsbSession;

    /// Walk every bus and read each device's descriptors
    fn discover(&self) -> rusb::Result<Vec<DiscoveredDevice>>;

    /// Open a session on the device currently at `location`
    fn open(&self, location: DeviceLocation) -> rusb::Result<Self::Session>;
}

/// libusb-backed host
pub struct RusbHost {
    context: Context,
}

impl RusbHost {
    pub fn new() -> Result<Self, UsbctlError> {
        let context = Context::new().map_err(UsbctlError::Host)?;
        Ok(Self { context })
    }
}

impl UsbHost for RusbHost {
    type Session = rusb::DeviceHandle<Context>;

    fn discover(&self) -> rusb::Result<Vec<DiscoveredDevice>> {
        let devices = self.context.devices()?;
        let mut found = Vec::with_capacity(devices.len());

        for device in devices.iter() {
            let location = DeviceLocation::new(device.bus_number(), device.address());
            match read_descriptor(&device) {
                Ok(descriptor) => found.push(DiscoveredDevice {
                    location,
                    descriptor,
                }),
                Err(e) => {
                    warn!("Failed to read descriptor of device {}: {}", location, e);
                }
            }
        }

        debug!("Discovered {} devices", found.len());
        Ok(found)
    }

    fn open(&self, location: DeviceLocation) -> rusb::Result<Self::Session> {
        let devices = self.context.devices()?;
        let device = devices
            .iter()
            .find(|d| d.bus_number() == location.bus && d.address() == location.address)
            .ok_or(rusb::Error::NoDevice)?;

        device.open()
    }
}

impl UsbSession for rusb::DeviceHandle<Context> {
    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool> {
        rusb::DeviceHandle::kernel_driver_active(self, interface)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        rusb::DeviceHandle::detach_kernel_driver(self, interface)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        rusb::DeviceHandle::attach_kernel_driver(self, interface)
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        rusb::DeviceHandle::claim_interface(self, interface)
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        rusb::DeviceHandle::release_interface(self, interface)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        rusb::DeviceHandle::write_control(self, request_type, request, value, index, data, timeout)
    }

    fn reset(&mut self) -> rusb::Result<()> {
        rusb::DeviceHandle::reset(self)
    }

    fn read_string_ascii(&self, index: u8) -> rusb::Result<String> {
        self.read_string_descriptor_ascii(index)
    }
}

/// Read the device descriptor and every readable configuration
fn read_descriptor(device: &Device<Context>) -> rusb::Result<DeviceDescriptor> {
    let desc = device.device_descriptor()?;

    let mut configurations = Vec::with_capacity(desc.num_configurations() as usize);
    for index in 0..desc.num_configurations() {
        match device.config_descriptor(index) {
            Ok(config) => configurations.push(convert_config(&config)),
            Err(e) => debug!(
                "Could not read configuration {} of device {:04x}:{:04x}: {}",
                index,
                desc.vendor_id(),
                desc.product_id(),
                e
            ),
        }
    }

    Ok(DeviceDescriptor {
        usb_version: convert_version(desc.usb_version()),
        class_code: desc.class_code(),
        sub_class_code: desc.sub_class_code(),
        protocol_code: desc.protocol_code(),
        max_packet_size: desc.max_packet_size(),
        vendor_id: desc.vendor_id(),
        product_id: desc.product_id(),
        release: convert_version(desc.device_version()),
        manufacturer_index: desc.manufacturer_string_index(),
        product_index: desc.product_string_index(),
        serial_number_index: desc.serial_number_string_index(),
        num_configurations: desc.num_configurations(),
        configurations,
    })
}

fn convert_version(version: rusb::Version) -> BcdVersion {
    BcdVersion {
        major: version.major(),
        minor: version.minor(),
        sub_minor: version.sub_minor(),
    }
}

fn convert_config(config: &rusb::ConfigDescriptor) -> ConfigDescriptor {
    // Bit 7 is reserved and always set
    let mut attributes = 0x80;
    if config.self_powered() {
        attributes |= 0x40;
    }
    if config.remote_wakeup() {
        attributes |= 0x20;
    }

    ConfigDescriptor {
        number: config.number(),
        attributes,
        max_power_ma: config.max_power(),
        description_index: config.description_string_index(),
        interfaces: config
            .interfaces()
            .map(|interface| InterfaceDescriptor {
                number: interface.number(),
                alt_settings: interface
                    .descriptors()
                    .map(|alt| convert_alt_setting(&alt))
                    .collect(),
            })
            .collect(),
    }
}

fn convert_alt_setting(alt: &rusb::InterfaceDescriptor) -> AltSetting {
    AltSetting {
        interface_number: alt.interface_number(),
        setting_number: alt.setting_number(),
        class_code: alt.class_code(),
        sub_class_code: alt.sub_class_code(),
        protocol_code: alt.protocol_code(),
        description_index: alt.description_string_index(),
        endpoints: alt
            .endpoint_descriptors()
            .map(|endpoint| convert_endpoint(&endpoint))
            .collect(),
    }
}

fn convert_endpoint(endpoint: &rusb::EndpointDescriptor) -> EndpointDescriptor {
    EndpointDescriptor {
        address: endpoint.address(),
        attributes: endpoint_attributes(
            endpoint.transfer_type(),
            endpoint.sync_type(),
            endpoint.usage_type(),
        ),
        max_packet_size: endpoint.max_packet_size(),
        interval: endpoint.interval(),
        refresh: endpoint.refresh(),
        synch_address: endpoint.synch_address(),
    }
}

/// Rebuild `bmAttributes` from rusb's decoded fields
fn endpoint_attributes(
    transfer: rusb::TransferType,
    sync: rusb::SyncType,
    usage: rusb::UsageType,
) -> u8 {
    let transfer_bits = match transfer {
        rusb::TransferType::Control => 0,
        rusb::TransferType::Isochronous => 1,
        rusb::TransferType::Bulk => 2,
        rusb::TransferType::Interrupt => 3,
    };
    let sync_bits = match sync {
        rusb::SyncType::NoSync => 0,
        rusb::SyncType::Asynchronous => 1,
        rusb::SyncType::Adaptive => 2,
        rusb::SyncType::Synchronous => 3,
    };
    let usage_bits = match usage {
        rusb::UsageType::Data => 0,
        rusb::UsageType::Feedback => 1,
        rusb::UsageType::FeedbackData => 2,
        rusb::UsageType::Reserved => 3,
    };

    transfer_bits | (sync_bits << 2) | (usage_bits << 4)
}
